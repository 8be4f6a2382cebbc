//! Integration test: the naive protocol can deadlock, and the engine both
//! notices and recovers.
//!
//! A two-agent ring with a wide gap between the first and second grant
//! deadlocks almost immediately: each agent takes its left resource and
//! then waits forever for the other's. The watchdog must flag it, and the
//! hard-stop phase must unwind both agents by closing the ring.

use std::thread;
use std::time::Duration;

use ringlock_core::{AgentId, ProtocolKind};
use ringlock_engine::{Simulation, SimulationConfig, StopCondition, StopReason};
use ringlock_test_utils::{init_tracing, wait_until};

fn forced_deadlock() -> SimulationConfig {
    SimulationConfig {
        think_duration: Duration::ZERO,
        think_jitter: Duration::ZERO,
        eat_duration: Duration::from_millis(1),
        acquire_gap: Duration::from_millis(200),
        watchdog_window: Duration::from_millis(500),
        grace_timeout: Duration::from_millis(200),
        hard_stop_budget: Duration::from_secs(2),
        ..SimulationConfig::new(2, ProtocolKind::Naive)
    }
}

#[test]
fn forced_deadlock_is_detected_and_hard_stopped() {
    init_tracing();
    let config = SimulationConfig {
        stop_on_deadlock: true,
        ..forced_deadlock()
    };
    let mut sim = Simulation::new(config).unwrap();
    let summary = sim
        .run(StopCondition::deadline(Duration::from_secs(20)))
        .unwrap();

    assert_eq!(summary.stop_reason, StopReason::DeadlockDetected);
    assert!(summary.deadlock_detected);
    assert_eq!(
        summary.shutdown.hard_stopped,
        vec![AgentId(0), AgentId(1)],
        "both agents were blocked inside an acquisition"
    );
    assert!(summary.shutdown.detached.is_empty());
    assert_eq!(summary.shutdown.agents_joined, 2);
    assert_eq!(sim.ring().holders(), vec![None, None]);
    assert_eq!(summary.violations, 0);
}

#[test]
fn watchdog_is_observable_while_deadlocked() {
    init_tracing();
    let mut sim = Simulation::new(forced_deadlock()).unwrap();
    sim.start().unwrap();
    let monitor = sim.monitor();

    assert!(
        wait_until(Duration::from_secs(10), || monitor
            .check_deadlock(Duration::from_millis(500))),
        "watchdog never fired on a forced deadlock"
    );
    let frozen = monitor.total_eats();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(monitor.total_eats(), frozen);

    let report = sim.shutdown(Duration::from_millis(100));
    assert_eq!(report.hard_stopped.len(), 2);
    assert!(report.detached.is_empty());
    assert!(!monitor.check_deadlock(Duration::from_millis(1)));
}

/// The classic five-agent table may or may not deadlock in a given run. If
/// the global count froze between the two samples, the watchdog must agree.
#[test]
fn five_agent_naive_freeze_implies_watchdog() {
    init_tracing();
    let config = SimulationConfig {
        think_duration: Duration::from_millis(5),
        think_jitter: Duration::from_millis(5),
        eat_duration: Duration::from_millis(20),
        acquire_gap: Duration::from_millis(5),
        grace_timeout: Duration::from_millis(200),
        ..SimulationConfig::new(5, ProtocolKind::Naive)
    };
    let window = config.watchdog_window;
    let mut sim = Simulation::new(config).unwrap();
    let monitor = sim.monitor();

    let sampler = thread::spawn(move || {
        thread::sleep(Duration::from_secs(5));
        let at_five = monitor.total_eats();
        thread::sleep(Duration::from_millis(3050));
        let at_eight = monitor.total_eats();
        (at_five, at_eight, monitor.check_deadlock(window))
    });

    let summary = sim
        .run(StopCondition::deadline(Duration::from_millis(8500)))
        .unwrap();
    let (at_five, at_eight, flagged) = sampler.join().unwrap();

    if at_five == at_eight {
        assert!(flagged, "no progress for 3s but watchdog stayed quiet");
        assert!(summary.deadlock_detected);
    }
    assert_eq!(summary.violations, 0);
    assert!(summary.shutdown.detached.is_empty());
}
