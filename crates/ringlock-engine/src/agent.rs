//! The agent thread body.
//!
//! Each agent owns one OS thread and cycles
//! `Thinking → Hungry → Acquiring → Eating → Releasing → Thinking` until it
//! is told to stop. Stop requests are observed at every transition and
//! interrupt think, eat and backoff pauses early; an agent never exits
//! while holding a resource unless the ring has been closed under it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use ringlock_core::{AgentId, AgentState, DenyReason, ResourceMisuseError};
use tracing::{debug, error};

use crate::config::SimulationConfig;
use crate::events::{ArbiterEvent, EventSink};
use crate::monitor::ProgressMonitor;
use crate::protocol::{Acquisition, AcquisitionProtocol};
use crate::ring::ResourceRing;

/// Cooperative stop request as seen by one agent.
///
/// The flag is the source of truth. The wake channel never carries a
/// message; the controller drops its sender on shutdown so that every
/// `recv_timeout` in a pause returns at once.
#[derive(Clone, Debug)]
pub(crate) struct StopSignal {
    flag: Arc<AtomicBool>,
    wake: Receiver<()>,
}

impl StopSignal {
    pub(crate) fn new(flag: Arc<AtomicBool>, wake: Receiver<()>) -> Self {
        Self { flag, wake }
    }

    pub(crate) fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Sleep for `d` unless stopped first. Returns `false` if the agent
    /// should stop.
    fn pause(&self, d: Duration) -> bool {
        if self.is_set() {
            return false;
        }
        if d.is_zero() {
            return true;
        }
        match self.wake.recv_timeout(d) {
            Err(RecvTimeoutError::Timeout) => !self.is_set(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

/// Reports the agent's exit to the controller, including on panic.
struct ExitNotice {
    agent: AgentId,
    tx: Sender<AgentId>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        // The controller may already have given up on this agent.
        let _ = self.tx.send(self.agent);
    }
}

/// What an agent thread hands back when joined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AgentExit {
    pub agent: AgentId,
    pub meals: u64,
    pub fault: Option<ResourceMisuseError>,
}

/// State owned by one agent thread.
pub(crate) struct Agent {
    id: AgentId,
    protocol: AcquisitionProtocol,
    config: Arc<SimulationConfig>,
    ring: Arc<ResourceRing>,
    monitor: Arc<ProgressMonitor>,
    events: Arc<EventSink>,
    stop: StopSignal,
    rng: ChaCha8Rng,
    meals: u64,
    _exit: ExitNotice,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: AgentId,
        config: Arc<SimulationConfig>,
        ring: Arc<ResourceRing>,
        monitor: Arc<ProgressMonitor>,
        events: Arc<EventSink>,
        stop: StopSignal,
        exit_tx: Sender<AgentId>,
    ) -> Self {
        let protocol = AcquisitionProtocol::from_kind(config.protocol, config.acquire_timeout);
        let rng = ChaCha8Rng::seed_from_u64(config.seed ^ u64::from(id.0));
        Self {
            id,
            protocol,
            config,
            ring,
            monitor,
            events,
            stop,
            rng,
            meals: 0,
            _exit: ExitNotice { agent: id, tx: exit_tx },
        }
    }

    /// Thread body. Runs until stopped, the ring closes, or a misuse
    /// fault aborts the agent.
    pub(crate) fn run(mut self) -> AgentExit {
        let span = tracing::debug_span!("agent", id = %self.id);
        let _guard = span.enter();
        debug!("agent started");

        let fault = match self.cycle() {
            Ok(()) => None,
            Err(e) => {
                error!(error = %e, "resource misuse, agent aborting");
                self.monitor.record_fault(e.clone());
                Some(e)
            }
        };

        self.set_state(AgentState::Stopped);
        self.events.emit(ArbiterEvent::Stopped {
            agent: self.id,
            meals: self.meals,
        });
        debug!(meals = self.meals, "agent stopped");
        AgentExit {
            agent: self.id,
            meals: self.meals,
            fault,
        }
    }

    fn set_state(&self, state: AgentState) {
        debug!(%state, "transition");
        self.monitor.set_state(self.id, state);
    }

    /// Publish `state` unless a stop was requested.
    fn enter(&self, state: AgentState) -> bool {
        if self.stop.is_set() {
            return false;
        }
        self.set_state(state);
        true
    }

    fn think_pause(&mut self) -> Duration {
        let jitter = self.config.think_jitter;
        let extra = if jitter.is_zero() {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.rng.random_range(0..=jitter.as_nanos() as u64))
        };
        self.config.think_duration.saturating_add(extra)
    }

    fn cycle(&mut self) -> Result<(), ResourceMisuseError> {
        let ring = Arc::clone(&self.ring);
        let left = ring.left_of(self.id);
        let right = ring.right_of(self.id);

        loop {
            if !self.enter(AgentState::Thinking) {
                return Ok(());
            }
            let think = self.think_pause();
            if !self.stop.pause(think) || !self.enter(AgentState::Hungry) {
                return Ok(());
            }

            let mut denials = 0u32;
            loop {
                if !self.enter(AgentState::Acquiring) {
                    return Ok(());
                }
                let outcome =
                    self.protocol
                        .acquire(self.id, left, right, self.config.acquire_gap)?;
                self.audit_holdings(outcome);

                let reason = match outcome {
                    Acquisition::Acquired => break,
                    Acquisition::Denied(reason) => reason,
                };
                denials += 1;
                debug!(%reason, denials, "acquisition denied");
                self.monitor.record_denied(self.id, reason);
                self.events.emit(ArbiterEvent::AcquireDenied {
                    agent: self.id,
                    reason,
                });
                self.set_state(AgentState::Hungry);
                if reason == DenyReason::Closed {
                    return Ok(());
                }
                let pause = self.config.backoff.pause(denials, &mut self.rng);
                if !self.stop.pause(pause) {
                    return Ok(());
                }
            }

            // Holding both resources from here on.
            if self.stop.is_set() {
                self.set_state(AgentState::Releasing);
                return self.protocol.release(self.id, left, right);
            }
            self.set_state(AgentState::Eating);
            let left_free = ring.enter_use(left.id());
            let right_free = ring.enter_use(right.id());
            if !(left_free && right_free) {
                error!("resource in use by a neighbour while eating");
                self.monitor.record_violation();
            }
            self.meals = self.monitor.record_eat(self.id);
            self.events.emit(ArbiterEvent::Ate {
                agent: self.id,
                meals: self.meals,
            });
            debug!(meals = self.meals, "eating");
            let finished = !self.stop.pause(self.config.eat_duration);
            ring.exit_use(left.id());
            ring.exit_use(right.id());

            self.set_state(AgentState::Releasing);
            self.protocol.release(self.id, left, right)?;
            if finished {
                return Ok(());
            }
        }
    }

    /// Holding count after a protocol call must match its outcome: two
    /// after a grant, zero after a denial.
    fn audit_holdings(&self, outcome: Acquisition) {
        let held = self.ring.held_by(self.id).len();
        let expected = if outcome.is_acquired() { 2 } else { 0 };
        if held != expected {
            error!(held, expected, "partial holding after acquisition");
            self.monitor.record_violation();
        }
    }
}
