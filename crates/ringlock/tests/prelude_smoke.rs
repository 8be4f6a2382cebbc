//! The prelude is enough to configure, run and inspect a simulation.

use std::time::Duration;

use ringlock::prelude::*;
use ringlock_test_utils::{init_tracing, BRISK};

#[test]
fn prelude_runs_every_protocol() {
    init_tracing();
    for protocol in ProtocolKind::ALL.into_iter().filter(|p| p.is_deadlock_free()) {
        let config = SimulationConfig {
            think_duration: BRISK.think,
            think_jitter: BRISK.think_jitter,
            eat_duration: BRISK.eat,
            acquire_timeout: BRISK.acquire_timeout,
            ..SimulationConfig::new(4, protocol)
        };
        let mut sim = Simulation::new(config).unwrap();
        let summary = sim
            .run(StopCondition::target_eats(40).with_deadline(Duration::from_secs(30)))
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::TargetReached, "{protocol}");
        assert_eq!(summary.protocol, protocol);
        assert_eq!(summary.violations, 0);
    }
}

#[test]
fn prelude_exposes_error_types() {
    let err: ConfigError = "nope".parse::<ProtocolKind>().unwrap_err();
    let sim_err: SimulationError = err.clone().into();
    assert_eq!(sim_err, SimulationError::Config(err));
}
