//! Agent lifecycle states, protocol selection and denial reasons.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

// ── AgentState ─────────────────────────────────────────────────────

/// Lifecycle state of an agent.
///
/// The normal cycle is `Thinking → Hungry → Acquiring → Eating → Releasing
/// → Thinking`. `Stopped` is terminal and reachable from any state once the
/// agent has observed cancellation and released everything it held.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AgentState {
    /// Pausing between meals; holds nothing.
    Thinking = 0,
    /// Wants both resources; holds nothing.
    Hungry = 1,
    /// Inside the acquisition protocol.
    Acquiring = 2,
    /// Holds both resources and is doing work.
    Eating = 3,
    /// Giving both resources back.
    Releasing = 4,
    /// Terminated.
    Stopped = 5,
}

impl AgentState {
    /// Decode a state previously stored with `as u8`.
    ///
    /// Unknown values decode as `Stopped`.
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Thinking,
            1 => Self::Hungry,
            2 => Self::Acquiring,
            3 => Self::Eating,
            4 => Self::Releasing,
            _ => Self::Stopped,
        }
    }

    /// Whether an agent in this state is allowed to hold resources.
    ///
    /// Only `Acquiring` (mid-protocol), `Eating` and `Releasing` may.
    pub fn may_hold(self) -> bool {
        matches!(self, Self::Acquiring | Self::Eating | Self::Releasing)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Thinking => "thinking",
            Self::Hungry => "hungry",
            Self::Acquiring => "acquiring",
            Self::Eating => "eating",
            Self::Releasing => "releasing",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

// ── ProtocolKind ───────────────────────────────────────────────────

/// Which acquisition protocol every agent in a simulation uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    /// Left then right, both waiting forever. Can deadlock.
    Naive,
    /// Left then right, each with a bounded wait; gives back the left
    /// resource if the right one cannot be had.
    TimeoutBackoff,
    /// Lower resource id first, then higher, both waiting forever.
    OrderedAcquisition,
}

impl ProtocolKind {
    /// All protocol kinds, in declaration order.
    pub const ALL: [ProtocolKind; 3] = [
        ProtocolKind::Naive,
        ProtocolKind::TimeoutBackoff,
        ProtocolKind::OrderedAcquisition,
    ];

    /// Canonical name, accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::TimeoutBackoff => "timeout_backoff",
            Self::OrderedAcquisition => "ordered_acquisition",
        }
    }

    /// Whether the protocol rules out deadlock by construction or by
    /// bounded holds.
    pub fn is_deadlock_free(self) -> bool {
        !matches!(self, Self::Naive)
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProtocolKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "naive" => Ok(Self::Naive),
            "timeout_backoff" | "timeoutbackoff" | "backoff" => Ok(Self::TimeoutBackoff),
            "ordered_acquisition" | "orderedacquisition" | "ordered" => {
                Ok(Self::OrderedAcquisition)
            }
            _ => Err(ConfigError::UnknownProtocol {
                name: s.to_string(),
            }),
        }
    }
}

// ── DenyReason ─────────────────────────────────────────────────────

/// Why an acquisition attempt ended holding nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// A bounded wait elapsed before the resource was granted.
    Timeout,
    /// A zero-length wait found the resource already held.
    Contention,
    /// The ring was closed by a hard stop while waiting.
    Closed,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::Contention => "contention",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}
