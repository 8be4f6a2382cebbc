//! Simulation configuration and validation.
//!
//! [`SimulationConfig`] is the builder-input for [`Simulation`](crate::Simulation).
//! [`validate()`](SimulationConfig::validate) checks every structural
//! invariant up front so that a running simulation never has to.

use std::time::Duration;

use rand::Rng;
use ringlock_core::{ConfigError, ProtocolKind};

use crate::ring::ResourceRing;

// ── BackoffConfig ──────────────────────────────────────────────────

/// Shape of the pause an agent takes after a denied acquisition.
///
/// The base pause grows geometrically with consecutive denials, is capped,
/// and gets uniform jitter added so that neighbours drift apart instead of
/// retrying in lock-step.
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffConfig {
    /// Pause after the first denial. Default: 50ms.
    pub initial: Duration,
    /// Multiplier per consecutive denial. Default: 1.5.
    pub factor: f64,
    /// Upper bound on the base pause. Default: 400ms.
    pub cap: Duration,
    /// Uniform jitter in `[0, jitter]` added on top. Default: 25ms.
    pub jitter: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(50),
            factor: 1.5,
            cap: Duration::from_millis(400),
            jitter: Duration::from_millis(25),
        }
    }
}

impl BackoffConfig {
    /// Check the invariants: finite `factor >= 1` and `initial <= cap`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(ConfigError::InvalidBackoff {
                reason: format!("factor must be finite and >= 1, got {}", self.factor),
            });
        }
        if self.initial > self.cap {
            return Err(ConfigError::InvalidBackoff {
                reason: format!(
                    "initial pause {:?} exceeds cap {:?}",
                    self.initial, self.cap
                ),
            });
        }
        Ok(())
    }

    /// Base pause after `denials` consecutive denials (1 = first denial),
    /// before jitter.
    pub fn base_pause(&self, denials: u32) -> Duration {
        let exp = denials.saturating_sub(1).min(64) as i32;
        let scaled = self.initial.as_nanos() as f64 * self.factor.powi(exp);
        if !scaled.is_finite() || scaled >= self.cap.as_nanos() as f64 {
            self.cap
        } else {
            Duration::from_nanos(scaled as u64)
        }
    }

    /// Full pause: base pause plus a jitter sample drawn from `rng`.
    pub fn pause<R: Rng>(&self, denials: u32, rng: &mut R) -> Duration {
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            Duration::from_nanos(rng.random_range(0..=self.jitter.as_nanos() as u64))
        };
        self.base_pause(denials).saturating_add(jitter)
    }
}

// ── SimulationConfig ───────────────────────────────────────────────

/// Everything needed to build a [`Simulation`](crate::Simulation).
///
/// Defaults follow the classic setup: five agents, 50ms think, 100ms eat,
/// 100ms per-resource acquisition timeout, fair resources, ordered
/// acquisition.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    /// Number of agents (and resources). Must be at least 2.
    pub agent_count: usize,
    /// Acquisition protocol shared by every agent.
    pub protocol: ProtocolKind,
    /// Serve waiting requesters of each resource in FIFO order.
    pub fairness: bool,
    /// Per-resource wait bound under `TimeoutBackoff`. Zero makes every
    /// attempt a non-blocking try-lock.
    pub acquire_timeout: Duration,
    /// How long an agent holds both resources per meal.
    pub eat_duration: Duration,
    /// Base pause between meals.
    pub think_duration: Duration,
    /// Uniform jitter in `[0, think_jitter]` added to each think pause.
    pub think_jitter: Duration,
    /// Pause between obtaining the first resource and requesting the
    /// second. Widens the circular-wait window; zero in normal runs.
    pub acquire_gap: Duration,
    /// Retry pause after a denied acquisition.
    pub backoff: BackoffConfig,
    /// Seed for per-agent jitter RNGs.
    pub seed: u64,
    /// No eat within this window while running counts as deadlock.
    pub watchdog_window: Duration,
    /// Agents below this fraction of the mean eat count are reported as
    /// starved in the run summary.
    pub starvation_ratio: f64,
    /// Cooperative shutdown budget used by `run()`.
    pub grace_timeout: Duration,
    /// Extra time agents get to exit after the ring is closed.
    pub hard_stop_budget: Duration,
    /// Capacity of the event channel. `None` disables events.
    pub event_capacity: Option<usize>,
    /// End `run()` as soon as the watchdog flags a deadlock.
    pub stop_on_deadlock: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            agent_count: 5,
            protocol: ProtocolKind::OrderedAcquisition,
            fairness: true,
            acquire_timeout: Duration::from_millis(100),
            eat_duration: Duration::from_millis(100),
            think_duration: Duration::from_millis(50),
            think_jitter: Duration::from_millis(10),
            acquire_gap: Duration::ZERO,
            backoff: BackoffConfig::default(),
            seed: 42,
            watchdog_window: Duration::from_secs(3),
            starvation_ratio: 0.2,
            grace_timeout: Duration::from_secs(1),
            hard_stop_budget: Duration::from_millis(500),
            event_capacity: None,
            stop_on_deadlock: false,
        }
    }
}

impl SimulationConfig {
    /// Default configuration for `agent_count` agents running `protocol`.
    pub fn new(agent_count: usize, protocol: ProtocolKind) -> Self {
        Self {
            agent_count,
            protocol,
            ..Self::default()
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent_count < ResourceRing::MIN_LEN {
            return Err(ConfigError::AgentCountTooSmall {
                configured: self.agent_count,
            });
        }
        if u32::try_from(self.agent_count).is_err() {
            return Err(ConfigError::AgentCountTooLarge {
                configured: self.agent_count,
            });
        }
        if self.watchdog_window.is_zero() {
            return Err(ConfigError::InvalidDuration {
                name: "watchdog_window",
                reason: "must be non-zero".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.starvation_ratio) {
            return Err(ConfigError::InvalidStarvationRatio {
                value: self.starvation_ratio,
            });
        }
        if self.event_capacity == Some(0) {
            return Err(ConfigError::EventChannelZero);
        }
        self.backoff.validate()
    }
}
