//! Optional observer channel.
//!
//! When `event_capacity` is set, agents publish [`ArbiterEvent`]s into a
//! bounded channel. Publishing never blocks: if nobody drains the channel
//! and it fills up, further events are dropped and counted.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};
use ringlock_core::{AgentId, DenyReason};

/// Something an agent did that an observer may care about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArbiterEvent {
    /// The agent started a meal.
    Ate {
        /// Who ate.
        agent: AgentId,
        /// The agent's meal count including this one.
        meals: u64,
    },
    /// An acquisition attempt was denied.
    AcquireDenied {
        /// Who was denied.
        agent: AgentId,
        /// Why.
        reason: DenyReason,
    },
    /// The agent's thread is exiting.
    Stopped {
        /// Who stopped.
        agent: AgentId,
        /// Final meal count.
        meals: u64,
    },
}

impl ArbiterEvent {
    /// The agent the event is about.
    pub fn agent(&self) -> AgentId {
        match self {
            Self::Ate { agent, .. }
            | Self::AcquireDenied { agent, .. }
            | Self::Stopped { agent, .. } => *agent,
        }
    }
}

/// Publishing half shared by all agents.
#[derive(Debug)]
pub(crate) struct EventSink {
    tx: Option<Sender<ArbiterEvent>>,
    dropped: AtomicU64,
}

impl EventSink {
    /// A sink that discards everything without counting.
    pub(crate) fn disabled() -> Self {
        Self {
            tx: None,
            dropped: AtomicU64::new(0),
        }
    }

    /// A bounded sink and its receiving end.
    pub(crate) fn bounded(capacity: usize) -> (Self, Receiver<ArbiterEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        let sink = Self {
            tx: Some(tx),
            dropped: AtomicU64::new(0),
        };
        (sink, rx)
    }

    pub(crate) fn emit(&self, event: ArbiterEvent) {
        if let Some(tx) = &self.tx {
            if tx.try_send(event).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Events lost to a full channel.
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
