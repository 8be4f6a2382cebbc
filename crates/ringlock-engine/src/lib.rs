//! Resource arbitration engine for ringlock.
//!
//! N agents sit in a ring with one shared resource between each pair of
//! neighbours. Every agent needs both of its resources at once, and an
//! [`AcquisitionProtocol`] decides how it asks for them. The
//! [`Simulation`] controller runs one OS thread per agent and reports
//! progress, deadlock and starvation through a [`ProgressMonitor`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod agent;
pub mod config;
pub mod error;
pub mod events;
pub mod monitor;
pub mod protocol;
pub mod resource;
pub mod ring;
pub mod simulation;

pub use config::{BackoffConfig, SimulationConfig};
pub use error::SimulationError;
pub use events::ArbiterEvent;
pub use monitor::{AgentProgress, ProgressMonitor, ProgressSnapshot};
pub use protocol::{Acquisition, AcquisitionProtocol};
pub use resource::{AcquireOutcome, Resource};
pub use ring::ResourceRing;
pub use simulation::{
    CancelHandle, RunSummary, ShutdownReport, Simulation, StopCondition, StopReason,
};
