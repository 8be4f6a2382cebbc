//! Integration test: the deadlock-free protocols keep every agent eating.
//!
//! Each scenario runs five agents on a contended ring until a global eat
//! target is reached, then checks liveness (target reached before the
//! deadline), fairness (every agent ate, nobody starved) and the self
//! checks (no exclusion or all-or-nothing violations).

use std::time::Duration;

use ringlock_core::ProtocolKind;
use ringlock_engine::{BackoffConfig, Simulation, SimulationConfig, StopCondition, StopReason};
use ringlock_test_utils::{init_tracing, CONTENDED};

fn contended(protocol: ProtocolKind, fairness: bool) -> SimulationConfig {
    SimulationConfig {
        fairness,
        think_duration: CONTENDED.think,
        think_jitter: CONTENDED.think_jitter,
        eat_duration: CONTENDED.eat,
        acquire_timeout: CONTENDED.acquire_timeout,
        backoff: BackoffConfig {
            initial: Duration::from_millis(2),
            factor: 1.5,
            cap: Duration::from_millis(20),
            jitter: Duration::from_millis(3),
        },
        ..SimulationConfig::new(5, protocol)
    }
}

#[test]
fn ordered_acquisition_reaches_target() {
    init_tracing();
    let mut sim = Simulation::new(contended(ProtocolKind::OrderedAcquisition, true)).unwrap();
    let summary = sim
        .run(StopCondition::target_eats(200).with_deadline(Duration::from_secs(30)))
        .unwrap();

    assert_eq!(summary.stop_reason, StopReason::TargetReached);
    assert!(summary.total_eats >= 200);
    // Overshoot is bounded by what the agents start between the last poll
    // and the stop flag.
    assert!(
        summary.total_eats <= 200 + 5 * 20,
        "total {} overshot the target",
        summary.total_eats
    );
    assert!(
        summary.every_agent_ate(),
        "eats: {:?}",
        summary.per_agent_eats()
    );
    assert!(!summary.deadlock_detected);
    assert_eq!(summary.violations, 0);
    assert!(summary.shutdown.hard_stopped.is_empty());
}

#[test]
fn timeout_backoff_reaches_target() {
    init_tracing();
    let mut sim = Simulation::new(contended(ProtocolKind::TimeoutBackoff, true)).unwrap();
    let summary = sim
        .run(StopCondition::target_eats(200).with_deadline(Duration::from_secs(60)))
        .unwrap();

    assert_eq!(summary.stop_reason, StopReason::TargetReached);
    assert!(
        summary.every_agent_ate(),
        "eats: {:?}",
        summary.per_agent_eats()
    );
    assert_eq!(summary.violations, 0);
    assert!(summary.shutdown.detached.is_empty());
}

#[test]
fn fair_backoff_does_not_starve_anyone() {
    init_tracing();
    let mut sim = Simulation::new(contended(ProtocolKind::TimeoutBackoff, true)).unwrap();
    let summary = sim
        .run(StopCondition::target_eats(200).with_deadline(Duration::from_secs(60)))
        .unwrap();

    assert_eq!(summary.stop_reason, StopReason::TargetReached);
    let min = summary.per_agent_eats().into_iter().min().unwrap();
    assert!(
        min >= 8,
        "an agent fell below 20% of the mean: {:?}",
        summary.per_agent_eats()
    );
    assert!(summary.starved.is_empty(), "starved: {:?}", summary.starved);
}

#[test]
fn non_blocking_backoff_reports_contention() {
    init_tracing();
    let config = SimulationConfig {
        acquire_timeout: Duration::ZERO,
        ..contended(ProtocolKind::TimeoutBackoff, false)
    };
    let mut sim = Simulation::new(config).unwrap();
    let summary = sim
        .run(StopCondition::target_eats(100).with_deadline(Duration::from_secs(60)))
        .unwrap();

    assert_eq!(summary.stop_reason, StopReason::TargetReached);
    let denials: u64 = summary.agents.iter().map(|a| a.denials).sum();
    let timeouts: u64 = summary.agents.iter().map(|a| a.timeouts).sum();
    assert!(denials > 0, "five agents on a busy ring never collided");
    assert_eq!(timeouts, 0, "a zero timeout never waits");
    assert_eq!(summary.violations, 0);
}

#[test]
fn every_protocol_keeps_exclusion_on_a_two_agent_ring() {
    init_tracing();
    for protocol in ProtocolKind::ALL {
        let config = SimulationConfig {
            think_duration: Duration::ZERO,
            think_jitter: Duration::from_millis(1),
            ..contended(protocol, false)
        };
        let config = SimulationConfig {
            agent_count: 2,
            ..config
        };
        let mut sim = Simulation::new(config).unwrap();
        let summary = sim
            .run(StopCondition::deadline(Duration::from_millis(300)))
            .unwrap();
        assert_eq!(summary.violations, 0, "{protocol}");
        assert!(summary.shutdown.detached.is_empty(), "{protocol}");
        assert!(
            sim.ring().holders().iter().all(Option::is_none),
            "{protocol} left resources held"
        );
    }
}
