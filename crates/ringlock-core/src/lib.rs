//! Core types for the ringlock arbitration engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! identifiers, lifecycle states and error types shared by the engine, the
//! test utilities and the facade crate.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod state;

pub use error::{ConfigError, ResourceMisuseError};
pub use id::{AgentId, ResourceId};
pub use state::{AgentState, DenyReason, ProtocolKind};
