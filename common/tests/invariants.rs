//! Property tests over random sample/setting sequences. Every reachable state
//! must keep the air handler exclusive, bound every heat/cool stage, honour
//! the stage cooldown and stay inert while disabled.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hvac_common::{
    Actuator, ActuatorState, CircuitConfig, EngineAction, Sample, SettingKey, Settings,
    ThermostatEngine,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Tick {
        temperature: Option<f32>,
        advance_secs: i64,
    },
    Disable(bool),
    WholeHouseFan(bool),
    High(i64),
    Low(i64),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        12 => (prop::option::weighted(0.95, 55.0f32..90.0), 0i64..900)
            .prop_map(|(temperature, advance_secs)| Step::Tick { temperature, advance_secs }),
        1 => any::<bool>().prop_map(Step::Disable),
        1 => any::<bool>().prop_map(Step::WholeHouseFan),
        1 => (60i64..90).prop_map(Step::High),
        1 => (55i64..85).prop_map(Step::Low),
    ]
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap()
}

fn exclusive(state: &ActuatorState) -> bool {
    [state.heat_on, state.cool_on, state.fan_on]
        .into_iter()
        .filter(|on| *on)
        .count()
        <= 1
}

fn running_stage(state: &ActuatorState) -> Option<Actuator> {
    if state.heat_on {
        Some(Actuator::Heat)
    } else if state.cool_on {
        Some(Actuator::Cool)
    } else {
        None
    }
}

fn energizes(actions: &[EngineAction]) -> bool {
    actions.iter().any(|action| {
        matches!(
            action,
            EngineAction::Relay { on: true, .. } | EngineAction::Circuit { on: true, .. }
        )
    })
}

proptest! {
    #[test]
    fn reachable_states_respect_invariants(steps in proptest::collection::vec(step(), 1..200)) {
        let mut now = start();
        let mut engine = ThermostatEngine::new(Settings::default(), CircuitConfig::default(), now);
        engine.initialize(now);
        let limit = Duration::minutes(i64::from(engine.settings().stage_limit_minutes));
        let mut stage: Option<(Actuator, DateTime<Utc>)> = None;
        // Ticks that ended with a stage still on past its limit. A window
        // expiring may consume the first such tick; the next one must end it.
        let mut overdue_ticks = 0u32;

        for step in steps {
            match step {
                Step::Tick { temperature, advance_secs } => {
                    now += Duration::seconds(advance_secs);
                    let sample = match temperature {
                        Some(t) => Sample::new(t, Some(45.0)),
                        None => Sample::invalid(),
                    };
                    let disabled = engine.settings().is_disabled();
                    let in_delay = now < engine.stage().delay_until();

                    let actions = engine.tick(sample, now);

                    prop_assert!(exclusive(&engine.actuators()), "exclusive group violated");
                    for action in &actions {
                        if let EngineAction::Report(report) = action {
                            prop_assert!(exclusive(&report.actuators));
                        }
                    }
                    if disabled {
                        prop_assert!(!energizes(&actions), "energized while disabled: {actions:?}");
                    }
                    if in_delay {
                        prop_assert!(!energizes(&actions), "energized during cooldown: {actions:?}");
                    }

                    stage = match (stage, running_stage(&engine.actuators())) {
                        (Some((previous, since)), Some(current)) if previous == current => {
                            Some((current, since))
                        }
                        (_, Some(current)) => Some((current, now)),
                        (_, None) => None,
                    };
                    match stage {
                        Some((actuator, since)) if now - since > limit => {
                            overdue_ticks += 1;
                            prop_assert!(
                                overdue_ticks <= 1,
                                "{} ran {} min past a {} min limit",
                                actuator.as_str(),
                                (now - since).num_minutes(),
                                limit.num_minutes()
                            );
                        }
                        _ => overdue_ticks = 0,
                    }
                }
                Step::Disable(disabled) => {
                    engine.apply_setting(SettingKey::SystemDisabled, i64::from(disabled)).unwrap();
                }
                Step::WholeHouseFan(enabled) => {
                    engine.apply_setting(SettingKey::UseWholeHouseFan, i64::from(enabled)).unwrap();
                }
                Step::High(value) => {
                    engine.apply_setting(SettingKey::HighSetpoint, value).unwrap();
                }
                Step::Low(value) => {
                    engine.apply_setting(SettingKey::LowSetpoint, value).unwrap();
                }
            }
        }
    }

    #[test]
    fn sensor_failure_always_leaves_everything_off(
        warmup in proptest::collection::vec(55.0f32..90.0, 0..20),
    ) {
        let mut now = start();
        let mut engine = ThermostatEngine::new(Settings::default(), CircuitConfig::default(), now);

        for temperature in warmup {
            now += Duration::minutes(2);
            engine.tick(Sample::new(temperature, None), now);
        }
        now += Duration::minutes(2);
        let actions = engine.tick(Sample::invalid(), now);

        prop_assert_eq!(engine.actuators(), ActuatorState::default());
        prop_assert!(!energizes(&actions));
    }
}
