//! Errors surfaced by the [`Simulation`](crate::Simulation) controller.

use ringlock_core::{AgentId, ConfigError, ResourceMisuseError};
use thiserror::Error;

/// Why a simulation operation failed.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum SimulationError {
    /// The configuration was rejected or agent threads could not start.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// An agent broke the single-holder contract; the run was aborted.
    #[error("run aborted on resource misuse: {0}")]
    ResourceMisuse(#[from] ResourceMisuseError),
    /// One or more agent threads panicked; they are listed in id order.
    #[error("agent threads panicked: {agents:?}")]
    AgentPanicked {
        /// Agents whose threads did not return normally.
        agents: Vec<AgentId>,
    },
    /// `start()` was called on a simulation that is already running.
    #[error("simulation is already running")]
    AlreadyStarted,
    /// The simulation has been shut down and cannot be restarted.
    #[error("simulation has already finished")]
    AlreadyFinished,
}
