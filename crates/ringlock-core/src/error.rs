//! Error types for the ringlock arbitration engine.
//!
//! Two families live here: [`ConfigError`], fatal at construction, and
//! [`ResourceMisuseError`], which signals an internal logic defect in how a
//! resource was acquired or released. Acquisition timeouts are not errors;
//! they are ordinary [`DenyReason`](crate::DenyReason) outcomes.

use thiserror::Error;

use crate::id::{AgentId, ResourceId};

/// Errors detected while validating a simulation configuration.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// A ring needs at least two agents to have distinct neighbours.
    #[error("agent count {configured} is below the minimum of 2")]
    AgentCountTooSmall {
        /// The configured count.
        configured: usize,
    },
    /// Agent count does not fit the `u32` id space.
    #[error("agent count {configured} exceeds u32::MAX")]
    AgentCountTooLarge {
        /// The configured count.
        configured: usize,
    },
    /// The protocol name did not match any known protocol.
    #[error("unknown acquisition protocol '{name}'")]
    UnknownProtocol {
        /// The name that failed to parse.
        name: String,
    },
    /// A duration setting is out of range.
    #[error("invalid duration for {name}: {reason}")]
    InvalidDuration {
        /// Which setting.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// BackoffConfig invariant violated.
    #[error("invalid backoff config: {reason}")]
    InvalidBackoff {
        /// Description of which invariant was violated.
        reason: String,
    },
    /// Starvation ratio is not in `[0, 1]`.
    #[error("starvation ratio must be within [0, 1], got {value}")]
    InvalidStarvationRatio {
        /// The invalid value.
        value: f64,
    },
    /// Event channel capacity is zero.
    #[error("event_capacity must be at least 1")]
    EventChannelZero,
    /// An agent thread could not be spawned.
    #[error("thread spawn failed: {reason}")]
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
}

/// A resource was released or re-acquired in a way that breaks the
/// single-holder contract.
///
/// Always a bug in the caller. The engine treats it as fatal for the run.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ResourceMisuseError {
    /// Release of a resource nobody holds (double release).
    #[error("agent {agent} released resource {resource} which is not held")]
    NotHeld {
        /// The resource.
        resource: ResourceId,
        /// The releasing agent.
        agent: AgentId,
    },
    /// Release of a resource held by a different agent.
    #[error("agent {agent} released resource {resource} held by agent {holder}")]
    HeldByOther {
        /// The resource.
        resource: ResourceId,
        /// The releasing agent.
        agent: AgentId,
        /// The actual holder.
        holder: AgentId,
    },
    /// Acquisition of a resource the agent already holds.
    #[error("agent {agent} tried to re-acquire resource {resource} it already holds")]
    AlreadyHeld {
        /// The resource.
        resource: ResourceId,
        /// The acquiring agent.
        agent: AgentId,
    },
}

impl ResourceMisuseError {
    /// The resource involved.
    pub fn resource(&self) -> ResourceId {
        match self {
            Self::NotHeld { resource, .. }
            | Self::HeldByOther { resource, .. }
            | Self::AlreadyHeld { resource, .. } => *resource,
        }
    }

    /// The agent whose call was rejected.
    pub fn agent(&self) -> AgentId {
        match self {
            Self::NotHeld { agent, .. }
            | Self::HeldByOther { agent, .. }
            | Self::AlreadyHeld { agent, .. } => *agent,
        }
    }
}
