//! The simulation controller.
//!
//! [`Simulation`] owns the ring, the monitor and one OS thread per agent.
//! It starts the agents, polls the monitor until a [`StopCondition`] is met,
//! and tears everything down in two phases:
//!
//! 1. **Cooperative**: set the stop flag and disconnect the wake channel so
//!    every interruptible pause returns, then wait up to the grace period
//!    for agents to report their exit.
//! 2. **Hard stop**: close the ring so agents blocked forever inside an
//!    acquisition (a naive deadlock) unwind, wait a short budget, and detach
//!    whatever is still stuck.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use ringlock_core::{AgentId, ConfigError, ProtocolKind};
use tracing::{debug, error, info, warn};

use crate::agent::{Agent, AgentExit, StopSignal};
use crate::config::SimulationConfig;
use crate::error::SimulationError;
use crate::events::{ArbiterEvent, EventSink};
use crate::monitor::{AgentProgress, ProgressMonitor};
use crate::ring::ResourceRing;

/// How often `run()` re-checks its stop condition and the watchdog.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

// ── StopCondition ─────────────────────────────────────────────────

/// When `run()` should return.
///
/// Conditions combine: the run ends at whichever is met first. With
/// neither set, only cancellation, a misuse fault or (if configured) a
/// detected deadlock end it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StopCondition {
    /// Stop once the global eat count reaches this value.
    pub target_eats: Option<u64>,
    /// Stop once this much time has passed since `run()` was called.
    pub deadline: Option<Duration>,
}

impl StopCondition {
    /// Stop at `n` global eats.
    pub fn target_eats(n: u64) -> Self {
        Self {
            target_eats: Some(n),
            deadline: None,
        }
    }

    /// Stop after `d`.
    pub fn deadline(d: Duration) -> Self {
        Self {
            target_eats: None,
            deadline: Some(d),
        }
    }

    /// Add a deadline to this condition.
    pub fn with_deadline(self, d: Duration) -> Self {
        Self {
            deadline: Some(d),
            ..self
        }
    }
}

/// Why `run()` returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The global eat target was reached.
    TargetReached,
    /// The deadline elapsed first.
    DeadlineElapsed,
    /// A [`CancelHandle`] was triggered.
    Cancelled,
    /// The watchdog flagged a deadlock and `stop_on_deadlock` was set.
    DeadlockDetected,
    /// An agent hit a resource misuse fault.
    Fault,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TargetReached => "target reached",
            Self::DeadlineElapsed => "deadline elapsed",
            Self::Cancelled => "cancelled",
            Self::DeadlockDetected => "deadlock detected",
            Self::Fault => "fault",
        };
        f.write_str(s)
    }
}

// ── CancelHandle ──────────────────────────────────────────────────

/// Stops a running [`Simulation::run`] from another thread.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request the run to end at its next poll.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether `cancel()` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ── Reports ───────────────────────────────────────────────────────

/// Outcome of the two-phase shutdown.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Total time spent in the shutdown sequence.
    pub total_ms: u64,
    /// Time spent waiting for cooperative exits.
    pub cooperative_ms: u64,
    /// Number of agent threads joined.
    pub agents_joined: usize,
    /// Agents that ignored the grace period and needed the ring closed.
    pub hard_stopped: Vec<AgentId>,
    /// Agents still running after the hard stop; their threads were
    /// detached.
    pub detached: Vec<AgentId>,
    /// Agents whose threads panicked instead of returning.
    pub panicked: Vec<AgentId>,
}

/// Result of [`Simulation::run`].
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    /// Protocol the agents used.
    pub protocol: ProtocolKind,
    /// Eats across all agents.
    pub total_eats: u64,
    /// Per-agent counters in id order.
    pub agents: Vec<AgentProgress>,
    /// Time from the `run()` call to the stop decision.
    pub elapsed: Duration,
    /// Why the run ended.
    pub stop_reason: StopReason,
    /// Whether the watchdog saw a window with no eats at any poll.
    pub deadlock_detected: bool,
    /// Agents below `starvation_ratio` of the mean at the end of the run.
    pub starved: Vec<AgentId>,
    /// Failed exclusion or all-or-nothing self-checks.
    pub violations: u64,
    /// Events lost to a full observer channel.
    pub events_dropped: u64,
    /// How the agent threads were stopped.
    pub shutdown: ShutdownReport,
}

impl RunSummary {
    /// Per-agent eat counts in id order.
    pub fn per_agent_eats(&self) -> Vec<u64> {
        self.agents.iter().map(|a| a.eats).collect()
    }

    /// Whether every agent ate at least once.
    pub fn every_agent_ate(&self) -> bool {
        self.agents.iter().all(|a| a.eats > 0)
    }
}

// ── Simulation ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Finished,
}

/// A ring of agents competing for shared resources under one protocol.
pub struct Simulation {
    config: Arc<SimulationConfig>,
    ring: Arc<ResourceRing>,
    monitor: Arc<ProgressMonitor>,
    events: Arc<EventSink>,
    event_rx: Option<Receiver<ArbiterEvent>>,
    stop_flag: Arc<AtomicBool>,
    wake_tx: Option<Sender<()>>,
    wake_rx: Receiver<()>,
    exit_tx: Option<Sender<AgentId>>,
    exit_rx: Receiver<AgentId>,
    agents: Vec<(AgentId, JoinHandle<AgentExit>)>,
    cancel: CancelHandle,
    phase: Phase,
    deadlock_seen: bool,
}

impl Simulation {
    /// Validate `config` and build the ring and monitor. No threads are
    /// started until [`start`](Self::start) or [`run`](Self::run).
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let ring = ResourceRing::new(config.agent_count, config.fairness)?;
        let monitor = ProgressMonitor::new(config.agent_count);
        let (events, event_rx) = match config.event_capacity {
            Some(capacity) => {
                let (sink, rx) = EventSink::bounded(capacity);
                (sink, Some(rx))
            }
            None => (EventSink::disabled(), None),
        };
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(0);
        let (exit_tx, exit_rx) = crossbeam_channel::unbounded();
        debug!(
            agents = config.agent_count,
            protocol = %config.protocol,
            fairness = config.fairness,
            "simulation built"
        );
        Ok(Self {
            config: Arc::new(config),
            ring: Arc::new(ring),
            monitor: Arc::new(monitor),
            events: Arc::new(events),
            event_rx,
            stop_flag: Arc::new(AtomicBool::new(false)),
            wake_tx: Some(wake_tx),
            wake_rx,
            exit_tx: Some(exit_tx),
            exit_rx,
            agents: Vec::new(),
            cancel: CancelHandle::default(),
            phase: Phase::Idle,
            deadlock_seen: false,
        })
    }

    /// Shorthand for the common knobs, with the protocol given by name.
    ///
    /// Everything not listed keeps its [`SimulationConfig::default`] value.
    pub fn build(
        agent_count: usize,
        protocol: &str,
        fairness: bool,
        acquire_timeout: Duration,
        eat_duration: Duration,
        think_duration: Duration,
    ) -> Result<Self, ConfigError> {
        let protocol = ProtocolKind::from_str(protocol)?;
        Self::new(SimulationConfig {
            fairness,
            acquire_timeout,
            eat_duration,
            think_duration,
            ..SimulationConfig::new(agent_count, protocol)
        })
    }

    /// The validated configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The shared resources.
    pub fn ring(&self) -> &Arc<ResourceRing> {
        &self.ring
    }

    /// Shared handle to the progress monitor, usable during and after the
    /// run.
    pub fn monitor(&self) -> Arc<ProgressMonitor> {
        Arc::clone(&self.monitor)
    }

    /// A handle that ends a running [`run`](Self::run) from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Receiver for agent events, if `event_capacity` was configured.
    ///
    /// Every subscriber shares one queue; each event goes to one of them.
    pub fn subscribe(&self) -> Option<Receiver<ArbiterEvent>> {
        self.event_rx.clone()
    }

    /// Whether agent threads are live.
    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    /// Spawn one thread per agent.
    pub fn start(&mut self) -> Result<(), SimulationError> {
        match self.phase {
            Phase::Idle => {}
            Phase::Running => return Err(SimulationError::AlreadyStarted),
            Phase::Finished => return Err(SimulationError::AlreadyFinished),
        }
        let exit_tx = self
            .exit_tx
            .take()
            .ok_or(SimulationError::AlreadyFinished)?;

        info!(
            agents = self.config.agent_count,
            protocol = %self.config.protocol,
            fairness = self.config.fairness,
            "simulation starting"
        );
        self.monitor.mark_started();
        self.phase = Phase::Running;

        for i in 0..self.config.agent_count {
            let id = AgentId(i as u32);
            let agent = Agent::new(
                id,
                Arc::clone(&self.config),
                Arc::clone(&self.ring),
                Arc::clone(&self.monitor),
                Arc::clone(&self.events),
                StopSignal::new(Arc::clone(&self.stop_flag), self.wake_rx.clone()),
                exit_tx.clone(),
            );
            let spawned = thread::Builder::new()
                .name(format!("ringlock-agent-{i}"))
                .spawn(move || agent.run());
            match spawned {
                Ok(handle) => self.agents.push((id, handle)),
                Err(e) => {
                    error!(agent = %id, error = %e, "failed to spawn agent thread");
                    self.shutdown(self.config.grace_timeout);
                    return Err(ConfigError::ThreadSpawnFailed {
                        reason: format!("agent {i}: {e}"),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Run until `stop` is met, then shut down and summarise.
    ///
    /// Starts the agents first if [`start`](Self::start) has not been
    /// called. A misuse fault in any agent ends the run with
    /// [`SimulationError::ResourceMisuse`] after shutdown completes; a
    /// panicked agent thread ends it with [`SimulationError::AgentPanicked`].
    pub fn run(&mut self, stop: StopCondition) -> Result<RunSummary, SimulationError> {
        match self.phase {
            Phase::Idle => self.start()?,
            Phase::Running => {}
            Phase::Finished => return Err(SimulationError::AlreadyFinished),
        }

        let started = Instant::now();
        let stop_reason = loop {
            if self.monitor.fault().is_some() {
                break StopReason::Fault;
            }
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if stop
                .target_eats
                .is_some_and(|target| self.monitor.total_eats() >= target)
            {
                break StopReason::TargetReached;
            }
            if stop.deadline.is_some_and(|d| started.elapsed() >= d) {
                break StopReason::DeadlineElapsed;
            }
            if self.poll_watchdog() && self.config.stop_on_deadlock {
                break StopReason::DeadlockDetected;
            }
            thread::sleep(POLL_INTERVAL);
        };
        let elapsed = started.elapsed();
        info!(
            reason = %stop_reason,
            total_eats = self.monitor.total_eats(),
            elapsed_ms = elapsed.as_millis() as u64,
            "simulation stopping"
        );

        let shutdown = self.shutdown(self.config.grace_timeout);
        if let Some(fault) = self.monitor.fault() {
            return Err(SimulationError::ResourceMisuse(fault.clone()));
        }
        if !shutdown.panicked.is_empty() {
            return Err(SimulationError::AgentPanicked {
                agents: shutdown.panicked,
            });
        }

        let snapshot = self.monitor.snapshot();
        let starved = self.monitor.check_starvation(self.config.starvation_ratio);
        if !starved.is_empty() {
            warn!(agents = ?starved, "starved agents");
        }
        Ok(RunSummary {
            protocol: self.config.protocol,
            total_eats: snapshot.total_eats,
            agents: snapshot.agents,
            elapsed,
            stop_reason,
            deadlock_detected: self.deadlock_seen,
            starved,
            violations: snapshot.violations,
            events_dropped: self.events.dropped(),
            shutdown,
        })
    }

    /// Check the watchdog, logging the first time it fires.
    fn poll_watchdog(&mut self) -> bool {
        let window = self.config.watchdog_window;
        if !self.monitor.check_deadlock(window) {
            return false;
        }
        if !self.deadlock_seen {
            self.deadlock_seen = true;
            warn!(
                window_ms = window.as_millis() as u64,
                holders = ?self.ring.holders(),
                "no progress within watchdog window, deadlock suspected"
            );
        }
        true
    }

    /// Stop every agent thread. Idempotent; later calls return an empty
    /// report.
    pub fn shutdown(&mut self, grace: Duration) -> ShutdownReport {
        match self.phase {
            Phase::Finished => return ShutdownReport::default(),
            Phase::Idle => {
                self.phase = Phase::Finished;
                self.wake_tx.take();
                self.exit_tx.take();
                return ShutdownReport::default();
            }
            Phase::Running => {}
        }

        let start = Instant::now();
        self.monitor.mark_stopped();

        // Phase 1: cooperative.
        self.stop_flag.store(true, Ordering::Release);
        self.wake_tx.take();
        let mut pending: BTreeSet<AgentId> = self.agents.iter().map(|(id, _)| *id).collect();
        self.await_exits(&mut pending, start.checked_add(grace));
        let cooperative_ms = start.elapsed().as_millis() as u64;

        // Phase 2: hard stop.
        let hard_stopped: Vec<AgentId> = pending.iter().copied().collect();
        if !hard_stopped.is_empty() {
            warn!(agents = ?hard_stopped, "grace period elapsed, closing ring");
            self.ring.close();
            let budget = Instant::now().checked_add(self.config.hard_stop_budget);
            self.await_exits(&mut pending, budget);
        }

        let mut agents_joined = 0;
        let mut panicked = Vec::new();
        for (id, handle) in self.agents.drain(..) {
            if pending.contains(&id) {
                warn!(agent = %id, "agent did not exit, detaching thread");
                continue;
            }
            match handle.join() {
                Ok(exit) => {
                    match &exit.fault {
                        Some(fault) => {
                            debug!(agent = %exit.agent, %fault, "agent joined after fault")
                        }
                        None => debug!(agent = %exit.agent, meals = exit.meals, "agent joined"),
                    }
                    agents_joined += 1;
                }
                Err(_) => {
                    error!(agent = %id, "agent thread panicked");
                    panicked.push(id);
                }
            }
        }

        self.phase = Phase::Finished;
        let report = ShutdownReport {
            total_ms: start.elapsed().as_millis() as u64,
            cooperative_ms,
            agents_joined,
            hard_stopped,
            detached: pending.into_iter().collect(),
            panicked,
        };
        info!(
            total_ms = report.total_ms,
            joined = report.agents_joined,
            hard_stopped = report.hard_stopped.len(),
            detached = report.detached.len(),
            panicked = report.panicked.len(),
            "simulation shut down"
        );
        report
    }

    /// Collect exit notices until `pending` is empty or `deadline` passes.
    /// `None` waits without a deadline.
    fn await_exits(&self, pending: &mut BTreeSet<AgentId>, deadline: Option<Instant>) {
        while !pending.is_empty() {
            let notice = match deadline {
                Some(deadline) => self.exit_rx.recv_deadline(deadline).ok(),
                None => self.exit_rx.recv().ok(),
            };
            match notice {
                Some(id) => {
                    pending.remove(&id);
                }
                None => break,
            }
        }
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        if self.phase == Phase::Running {
            self.shutdown(self.config.grace_timeout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringlock_core::AgentState;

    fn quick(n: usize, protocol: ProtocolKind) -> SimulationConfig {
        SimulationConfig {
            think_duration: Duration::from_millis(2),
            think_jitter: Duration::from_millis(1),
            eat_duration: Duration::from_millis(2),
            acquire_timeout: Duration::from_millis(10),
            ..SimulationConfig::new(n, protocol)
        }
    }

    #[test]
    fn build_rejects_bad_input() {
        let ms = Duration::from_millis(1);
        assert!(matches!(
            Simulation::build(1, "ordered", true, ms, ms, ms),
            Err(ConfigError::AgentCountTooSmall { configured: 1 })
        ));
        assert!(matches!(
            Simulation::build(5, "bogus", true, ms, ms, ms),
            Err(ConfigError::UnknownProtocol { .. })
        ));
        let sim = Simulation::build(5, "timeout-backoff", false, ms, ms, ms).unwrap();
        assert_eq!(sim.config().protocol, ProtocolKind::TimeoutBackoff);
        assert!(!sim.config().fairness);
    }

    #[test]
    fn shutdown_before_start_is_a_no_op() {
        let mut sim = Simulation::new(quick(3, ProtocolKind::Naive)).unwrap();
        assert_eq!(sim.shutdown(Duration::ZERO), ShutdownReport::default());
        assert_eq!(sim.start(), Err(SimulationError::AlreadyFinished));
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut sim = Simulation::new(quick(3, ProtocolKind::OrderedAcquisition)).unwrap();
        sim.start().unwrap();
        assert_eq!(sim.start(), Err(SimulationError::AlreadyStarted));
        let report = sim.shutdown(Duration::from_secs(2));
        assert_eq!(report.agents_joined, 3);
        assert!(report.hard_stopped.is_empty());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut sim = Simulation::new(quick(4, ProtocolKind::TimeoutBackoff)).unwrap();
        sim.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        let first = sim.shutdown(Duration::from_secs(2));
        assert_eq!(first.agents_joined, 4);
        assert_eq!(sim.shutdown(Duration::from_secs(2)), ShutdownReport::default());
        assert!(!sim.is_running());
        let monitor = sim.monitor();
        for i in 0..4 {
            assert_eq!(monitor.state(AgentId(i)), AgentState::Stopped);
        }
        assert_eq!(
            sim.run(StopCondition::target_eats(1)),
            Err(SimulationError::AlreadyFinished)
        );
    }

    #[test]
    fn run_stops_at_target() {
        let mut sim = Simulation::new(quick(3, ProtocolKind::OrderedAcquisition)).unwrap();
        let summary = sim
            .run(StopCondition::target_eats(20).with_deadline(Duration::from_secs(20)))
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::TargetReached);
        assert!(summary.total_eats >= 20);
        assert_eq!(summary.per_agent_eats().iter().sum::<u64>(), summary.total_eats);
        assert_eq!(summary.violations, 0);
        assert_eq!(summary.shutdown.agents_joined, 3);
    }

    #[test]
    fn cancel_handle_ends_run() {
        let mut sim = Simulation::new(quick(3, ProtocolKind::OrderedAcquisition)).unwrap();
        let cancel = sim.cancel_handle();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            cancel.cancel();
        });
        let summary = sim.run(StopCondition::default()).unwrap();
        canceller.join().unwrap();
        assert_eq!(summary.stop_reason, StopReason::Cancelled);
    }

    #[test]
    fn shutdown_with_unbounded_grace_waits_for_exits() {
        let mut sim = Simulation::new(quick(4, ProtocolKind::OrderedAcquisition)).unwrap();
        sim.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        let report = sim.shutdown(Duration::MAX);
        assert_eq!(report.agents_joined, 4);
        assert!(report.hard_stopped.is_empty());
        assert!(report.detached.is_empty());
        assert!(report.panicked.is_empty());
    }

    #[test]
    fn max_durations_do_not_take_agents_down() {
        let config = SimulationConfig {
            think_duration: Duration::MAX,
            think_jitter: Duration::from_millis(5),
            grace_timeout: Duration::MAX,
            hard_stop_budget: Duration::MAX,
            ..quick(3, ProtocolKind::TimeoutBackoff)
        };
        assert!(config.validate().is_ok());
        let mut sim = Simulation::new(config).unwrap();
        let summary = sim
            .run(StopCondition::deadline(Duration::from_millis(50)))
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::DeadlineElapsed);
        assert_eq!(summary.shutdown.agents_joined, 3);
        assert!(summary.shutdown.panicked.is_empty());
        assert!(summary.shutdown.hard_stopped.is_empty());
    }

    #[test]
    fn stop_condition_builders() {
        let c = StopCondition::target_eats(5).with_deadline(Duration::from_secs(1));
        assert_eq!(c.target_eats, Some(5));
        assert_eq!(c.deadline, Some(Duration::from_secs(1)));
        assert_eq!(StopCondition::deadline(Duration::ZERO).target_eats, None);
    }
}
