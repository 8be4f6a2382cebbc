//! Acquisition protocols.
//!
//! An [`AcquisitionProtocol`] takes an agent's two resources and either
//! grants both or leaves the agent holding neither. No variant ever returns
//! with exactly one resource held, including when it fails on a misuse
//! error halfway through.
//!
//! | Variant | Order | Wait | Deadlock |
//! |---------|-------|------|----------|
//! | `Naive` | left, right | forever | possible |
//! | `TimeoutBackoff` | left, right | bounded | no (bounded holds) |
//! | `OrderedAcquisition` | lower id, higher id | forever | no (no cycle) |

use std::thread;
use std::time::Duration;

use ringlock_core::{AgentId, DenyReason, ProtocolKind, ResourceMisuseError};

use crate::resource::{AcquireOutcome, Resource};

/// Outcome of one protocol invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquisition {
    /// Both resources are now held by the caller.
    Acquired,
    /// Neither resource is held by the caller.
    Denied(DenyReason),
}

impl Acquisition {
    /// Whether both resources were obtained.
    pub fn is_acquired(self) -> bool {
        matches!(self, Self::Acquired)
    }
}

/// Strategy for obtaining an agent's left and right resources.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionProtocol {
    /// Left first, then right, waiting forever on each.
    Naive,
    /// Left then right, each bounded by `timeout`; the left resource is
    /// given back at once if the right one is not granted.
    TimeoutBackoff {
        /// Per-resource wait bound.
        timeout: Duration,
    },
    /// Lower [`ResourceId`](ringlock_core::ResourceId) first, then the
    /// higher one, waiting forever on each.
    OrderedAcquisition,
}

impl AcquisitionProtocol {
    /// Build the protocol for `kind`. `timeout` only matters for
    /// `TimeoutBackoff`.
    pub fn from_kind(kind: ProtocolKind, timeout: Duration) -> Self {
        match kind {
            ProtocolKind::Naive => Self::Naive,
            ProtocolKind::TimeoutBackoff => Self::TimeoutBackoff { timeout },
            ProtocolKind::OrderedAcquisition => Self::OrderedAcquisition,
        }
    }

    /// The kind this protocol was built from.
    pub fn kind(&self) -> ProtocolKind {
        match self {
            Self::Naive => ProtocolKind::Naive,
            Self::TimeoutBackoff { .. } => ProtocolKind::TimeoutBackoff,
            Self::OrderedAcquisition => ProtocolKind::OrderedAcquisition,
        }
    }

    /// Try to obtain both `left` and `right` for `agent`.
    ///
    /// `gap` is slept between the first grant and the second request.
    pub fn acquire(
        &self,
        agent: AgentId,
        left: &Resource,
        right: &Resource,
        gap: Duration,
    ) -> Result<Acquisition, ResourceMisuseError> {
        match *self {
            Self::Naive => blocking_pair(agent, left, right, gap),
            Self::OrderedAcquisition => {
                if left.id() < right.id() {
                    blocking_pair(agent, left, right, gap)
                } else {
                    blocking_pair(agent, right, left, gap)
                }
            }
            Self::TimeoutBackoff { timeout } => {
                let denied = |outcome: AcquireOutcome| match outcome {
                    AcquireOutcome::Closed => DenyReason::Closed,
                    _ if timeout.is_zero() => DenyReason::Contention,
                    _ => DenyReason::Timeout,
                };

                let first = left.try_acquire(agent, timeout)?;
                if first != AcquireOutcome::Acquired {
                    return Ok(Acquisition::Denied(denied(first)));
                }
                pause(gap);
                match right.try_acquire(agent, timeout) {
                    Ok(AcquireOutcome::Acquired) => Ok(Acquisition::Acquired),
                    Ok(second) => {
                        left.release(agent)?;
                        Ok(Acquisition::Denied(denied(second)))
                    }
                    Err(e) => {
                        let _ = left.release(agent);
                        Err(e)
                    }
                }
            }
        }
    }

    /// Give back both resources.
    ///
    /// Both releases are attempted even if the first fails; the first
    /// error is returned.
    pub fn release(
        &self,
        agent: AgentId,
        left: &Resource,
        right: &Resource,
    ) -> Result<(), ResourceMisuseError> {
        let r = right.release(agent);
        let l = left.release(agent);
        r.and(l)
    }
}

fn pause(gap: Duration) {
    if !gap.is_zero() {
        thread::sleep(gap);
    }
}

/// Take `first` then `second`, waiting forever on each. Only a closed ring
/// can make this fail.
fn blocking_pair(
    agent: AgentId,
    first: &Resource,
    second: &Resource,
    gap: Duration,
) -> Result<Acquisition, ResourceMisuseError> {
    if first.acquire(agent)? != AcquireOutcome::Acquired {
        return Ok(Acquisition::Denied(DenyReason::Closed));
    }
    pause(gap);
    match second.acquire(agent) {
        Ok(AcquireOutcome::Acquired) => Ok(Acquisition::Acquired),
        Ok(_) => {
            first.release(agent)?;
            Ok(Acquisition::Denied(DenyReason::Closed))
        }
        Err(e) => {
            let _ = first.release(agent);
            Err(e)
        }
    }
}
