//! Test helpers for ringlock development.
//!
//! Log capture, polling waits, and timing presets short enough to keep
//! threaded tests fast.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

/// Install a test-writer `fmt` subscriber once per process.
///
/// Honours `RUST_LOG`; defaults to `warn`. Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Poll `cond` every few milliseconds until it holds or `timeout` passes.
/// Returns whether it held.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Millisecond-scale durations for a fast but still contended run.
#[derive(Clone, Copy, Debug)]
pub struct Timing {
    pub think: Duration,
    pub think_jitter: Duration,
    pub eat: Duration,
    pub acquire_timeout: Duration,
}

/// Eating dominates thinking, so neighbours contend constantly.
pub const CONTENDED: Timing = Timing {
    think: Duration::from_millis(2),
    think_jitter: Duration::from_millis(2),
    eat: Duration::from_millis(5),
    acquire_timeout: Duration::from_millis(10),
};

/// Short everything, for runs that only need a handful of meals.
pub const BRISK: Timing = Timing {
    think: Duration::from_millis(1),
    think_jitter: Duration::from_millis(1),
    eat: Duration::from_millis(1),
    acquire_timeout: Duration::from_millis(5),
};
