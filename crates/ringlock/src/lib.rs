//! Ringlock: compare deadlock-prone and deadlock-free acquisition protocols
//! over a ring of shared resources.
//!
//! This is the facade crate that re-exports the public API from the
//! ringlock sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use std::time::Duration;
//! use ringlock::prelude::*;
//!
//! let config = SimulationConfig {
//!     think_duration: Duration::from_millis(1),
//!     eat_duration: Duration::from_millis(1),
//!     ..SimulationConfig::new(5, ProtocolKind::OrderedAcquisition)
//! };
//! let mut sim = Simulation::new(config).unwrap();
//! let summary = sim
//!     .run(StopCondition::target_eats(25).with_deadline(Duration::from_secs(30)))
//!     .unwrap();
//! assert_eq!(summary.stop_reason, StopReason::TargetReached);
//! assert_eq!(summary.violations, 0);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `ringlock-core` | Ids, lifecycle states, protocol kinds, errors |
//! | [`engine`] | `ringlock-engine` | Resources, protocols, monitor, simulation controller |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Ids, states and error types (`ringlock-core`).
pub use ringlock_core as types;

/// Resources, the ring, protocols and the simulation controller
/// (`ringlock-engine`).
///
/// [`engine::Simulation`] is the entry point; [`engine::Resource`] and
/// [`engine::AcquisitionProtocol`] are usable on their own.
pub use ringlock_engine as engine;

/// Common imports for typical ringlock usage.
///
/// ```rust
/// use ringlock::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use ringlock_core::{AgentId, AgentState, DenyReason, ProtocolKind, ResourceId};

    // Errors
    pub use ringlock_core::{ConfigError, ResourceMisuseError};
    pub use ringlock_engine::SimulationError;

    // Engine
    pub use ringlock_engine::{
        ArbiterEvent, BackoffConfig, CancelHandle, ProgressMonitor, ProgressSnapshot, RunSummary,
        ShutdownReport, Simulation, SimulationConfig, StopCondition, StopReason,
    };
}
