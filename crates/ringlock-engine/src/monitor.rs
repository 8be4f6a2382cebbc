//! Progress accounting and the deadlock / starvation watchdog.
//!
//! Agents write to the monitor; only the controller and observers read it.
//! Every counter is a lock-free atomic so recording an eat never contends
//! with a reader taking a snapshot.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use ringlock_core::{AgentId, AgentState, DenyReason, ResourceMisuseError};

/// Per-agent counters, padded to avoid false sharing between agents
/// recording on adjacent slots.
///
/// 128-byte alignment covers both 64-byte and 128-byte cache lines.
#[repr(align(128))]
#[derive(Debug)]
struct AgentSlot {
    eats: AtomicU64,
    denials: AtomicU64,
    timeouts: AtomicU64,
    state: AtomicU8,
}

impl AgentSlot {
    fn new() -> Self {
        Self {
            eats: AtomicU64::new(0),
            denials: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            state: AtomicU8::new(AgentState::Thinking as u8),
        }
    }
}

/// Shared progress counters for one simulation.
#[derive(Debug)]
pub struct ProgressMonitor {
    origin: Instant,
    total_eats: AtomicU64,
    /// Nanoseconds since `origin` of the last eat (or of `mark_started`).
    last_progress_ns: AtomicU64,
    running: AtomicBool,
    slots: Box<[AgentSlot]>,
    violations: AtomicU64,
    fault: OnceLock<ResourceMisuseError>,
}

// Compile-time assertion: shared across agent threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ProgressMonitor>();
};

impl ProgressMonitor {
    /// Zeroed counters for `agent_count` agents, not yet running.
    pub fn new(agent_count: usize) -> Self {
        Self {
            origin: Instant::now(),
            total_eats: AtomicU64::new(0),
            last_progress_ns: AtomicU64::new(0),
            running: AtomicBool::new(false),
            slots: (0..agent_count).map(|_| AgentSlot::new()).collect(),
            violations: AtomicU64::new(0),
            fault: OnceLock::new(),
        }
    }

    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn slot(&self, agent: AgentId) -> &AgentSlot {
        &self.slots[agent.index()]
    }

    /// Number of agents tracked.
    pub fn agent_count(&self) -> usize {
        self.slots.len()
    }

    /// Mark the run as started. The deadlock window is measured from here
    /// until the first eat.
    pub fn mark_started(&self) {
        self.last_progress_ns.store(self.now_ns(), Ordering::Release);
        self.running.store(true, Ordering::Release);
    }

    /// Mark the run as stopped. The watchdog stays quiet afterwards.
    pub fn mark_stopped(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Whether the run is between `mark_started` and `mark_stopped`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Count one eat for `agent`. Returns the agent's new total.
    pub fn record_eat(&self, agent: AgentId) -> u64 {
        let meals = self.slot(agent).eats.fetch_add(1, Ordering::AcqRel) + 1;
        self.total_eats.fetch_add(1, Ordering::AcqRel);
        self.last_progress_ns.store(self.now_ns(), Ordering::Release);
        meals
    }

    /// Count one denied acquisition for `agent`.
    pub fn record_denied(&self, agent: AgentId, reason: DenyReason) {
        let slot = self.slot(agent);
        slot.denials.fetch_add(1, Ordering::Relaxed);
        if reason == DenyReason::Timeout {
            slot.timeouts.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Publish `agent`'s current lifecycle state.
    pub fn set_state(&self, agent: AgentId, state: AgentState) {
        self.slot(agent).state.store(state as u8, Ordering::Release);
    }

    /// Last published state of `agent`.
    pub fn state(&self, agent: AgentId) -> AgentState {
        AgentState::from_u8(self.slot(agent).state.load(Ordering::Acquire))
    }

    /// Count one failed exclusion or all-or-nothing check.
    pub fn record_violation(&self) {
        self.violations.fetch_add(1, Ordering::AcqRel);
    }

    /// Failed self-checks so far. Zero in a correct run.
    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Acquire)
    }

    /// Record a misuse fault. Only the first one is kept; returns whether
    /// this call stored it.
    pub fn record_fault(&self, err: ResourceMisuseError) -> bool {
        self.fault.set(err).is_ok()
    }

    /// The first misuse fault, if any agent hit one.
    pub fn fault(&self) -> Option<&ResourceMisuseError> {
        self.fault.get()
    }

    /// Eats across all agents.
    pub fn total_eats(&self) -> u64 {
        self.total_eats.load(Ordering::Acquire)
    }

    /// Eats by `agent`.
    pub fn eats(&self, agent: AgentId) -> u64 {
        self.slot(agent).eats.load(Ordering::Acquire)
    }

    /// Time since the last eat, or since the run started if nobody has
    /// eaten yet.
    pub fn since_last_progress(&self) -> Duration {
        let last = self.last_progress_ns.load(Ordering::Acquire);
        Duration::from_nanos(self.now_ns().saturating_sub(last))
    }

    /// `true` iff the run is active and no eat happened within `window`.
    pub fn check_deadlock(&self, window: Duration) -> bool {
        self.is_running() && self.since_last_progress() >= window
    }

    /// Agents whose eat count is strictly below `ratio` times the mean.
    ///
    /// Empty while nobody has eaten.
    pub fn check_starvation(&self, ratio: f64) -> Vec<AgentId> {
        let counts: Vec<u64> = self
            .slots
            .iter()
            .map(|s| s.eats.load(Ordering::Acquire))
            .collect();
        starved(&counts, ratio)
            .into_iter()
            .map(|i| AgentId(i as u32))
            .collect()
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let agents = self
            .slots
            .iter()
            .enumerate()
            .map(|(i, s)| AgentProgress {
                agent: AgentId(i as u32),
                eats: s.eats.load(Ordering::Acquire),
                denials: s.denials.load(Ordering::Acquire),
                timeouts: s.timeouts.load(Ordering::Acquire),
                state: AgentState::from_u8(s.state.load(Ordering::Acquire)),
            })
            .collect();
        ProgressSnapshot {
            total_eats: self.total_eats(),
            agents,
            since_last_progress: self.since_last_progress(),
            running: self.is_running(),
            violations: self.violations(),
        }
    }
}

/// Indices whose count is below `ratio * mean`. Empty if the total is zero.
fn starved(counts: &[u64], ratio: f64) -> Vec<usize> {
    let total: u64 = counts.iter().sum();
    if total == 0 || counts.is_empty() {
        return Vec::new();
    }
    let threshold = ratio * total as f64 / counts.len() as f64;
    counts
        .iter()
        .enumerate()
        .filter(|&(_, &c)| (c as f64) < threshold)
        .map(|(i, _)| i)
        .collect()
}

/// One agent's counters in a [`ProgressSnapshot`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentProgress {
    /// Which agent.
    pub agent: AgentId,
    /// Meals eaten.
    pub eats: u64,
    /// Denied acquisition attempts, of any reason.
    pub denials: u64,
    /// Denials caused by a wait timing out.
    pub timeouts: u64,
    /// Last published state.
    pub state: AgentState,
}

/// Copy of the monitor's counters.
///
/// Counters are read one by one, so `total_eats` can run slightly ahead of
/// the per-agent sum while agents are active.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressSnapshot {
    /// Eats across all agents.
    pub total_eats: u64,
    /// Per-agent counters in id order.
    pub agents: Vec<AgentProgress>,
    /// Time since the last eat.
    pub since_last_progress: Duration,
    /// Whether the run was active.
    pub running: bool,
    /// Failed self-checks.
    pub violations: u64,
}

impl ProgressSnapshot {
    /// Per-agent eat counts in id order.
    pub fn eats(&self) -> Vec<u64> {
        self.agents.iter().map(|a| a.eats).collect()
    }

    /// Smallest per-agent eat count.
    pub fn min_eats(&self) -> u64 {
        self.agents.iter().map(|a| a.eats).min().unwrap_or(0)
    }

    /// Mean eats per agent.
    pub fn mean_eats(&self) -> f64 {
        if self.agents.is_empty() {
            return 0.0;
        }
        self.agents.iter().map(|a| a.eats).sum::<u64>() as f64 / self.agents.len() as f64
    }
}
