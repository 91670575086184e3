use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use anyhow::anyhow;
use chrono::Utc;
use chrono_tz::Tz;
use hvac_common::{
    status_topic, BusError, CommandError, EngineAction, MessageBus, RelayDriver, RemoteCommand,
    SensorDriver, ThermostatEngine, TOPIC_CIRCUIT_COMMAND,
};
use tokio::{
    sync::{watch, Mutex},
    time::MissedTickBehavior,
};
use tracing::{info, warn};

use crate::sensor::SensorReader;

/// Engine plus the halt latch, shared by the control loop, the command
/// listener and the HTTP API. Every engine mutation goes through the mutex.
#[derive(Clone)]
pub struct SharedState {
    pub engine: Arc<Mutex<ThermostatEngine>>,
    halt: Arc<watch::Sender<bool>>,
}

impl SharedState {
    pub fn new(engine: ThermostatEngine) -> Self {
        let (halt, _) = watch::channel(false);
        Self {
            engine: Arc::new(Mutex::new(engine)),
            halt: Arc::new(halt),
        }
    }

    pub fn request_halt(&self) {
        self.halt.send_replace(true);
    }

    pub fn is_halted(&self) -> bool {
        *self.halt.borrow()
    }

    /// Resolves once a halt has been requested.
    pub async fn halted(&self) {
        let mut latch = self.halt.subscribe();
        let _ = latch.wait_for(|halted| *halted).await;
    }
}

pub struct Controller<D, R, B> {
    state: SharedState,
    sensor: SensorReader<D>,
    relay: R,
    bus: B,
    status_topic: String,
    timezone: Tz,
}

impl<D, R, B> Controller<D, R, B>
where
    D: SensorDriver + 'static,
    R: RelayDriver,
    B: MessageBus,
{
    pub fn new(
        state: SharedState,
        sensor: SensorReader<D>,
        relay: R,
        bus: B,
        room: &str,
        timezone: Tz,
    ) -> Self {
        Self {
            state,
            sensor,
            relay,
            bus,
            status_topic: status_topic(room),
            timezone,
        }
    }

    /// Runs until a halt is requested, then de-energizes everything. A tick
    /// already in flight when the halt arrives is allowed to finish.
    pub async fn run(mut self, interval: Duration) {
        let actions = self.state.engine.lock().await.initialize(Utc::now());
        self.execute(actions);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.state.halted() => {}
            }
            if self.state.is_halted() {
                break;
            }
            if let Err(err) = self.run_cycle().await {
                warn!("control tick failed: {err:#}");
            }
        }

        let actions = self.state.engine.lock().await.halt(Utc::now());
        self.execute(actions);
        info!("control loop halted");
    }

    /// Acquire, decide, execute. The sensor is read before the engine lock is
    /// taken so remote commands are not blocked by sensor retries.
    pub async fn run_cycle(&mut self) -> anyhow::Result<()> {
        let retry_limit = self
            .state
            .engine
            .lock()
            .await
            .settings()
            .failed_read_halt_limit;
        let sample = self.sensor.read(retry_limit).await;

        let now = Utc::now();
        let actions = {
            let mut engine = self.state.engine.lock().await;
            std::panic::catch_unwind(AssertUnwindSafe(|| engine.tick(sample, now)))
                .map_err(|_| anyhow!("engine panicked while deciding"))?
        };
        self.execute(actions);
        Ok(())
    }

    fn execute(&mut self, actions: Vec<EngineAction>) {
        for action in actions {
            match action {
                EngineAction::Relay { actuator, on } => {
                    if let Err(err) = self.relay.set_circuit(actuator, on) {
                        warn!("{err}");
                    }
                }
                EngineAction::Circuit { name, on } => {
                    let command = EngineAction::circuit_command(&name, on);
                    if let Err(err) = self.bus.publish(TOPIC_CIRCUIT_COMMAND, &command) {
                        warn!("circuit command {command:?} dropped: {err}");
                    }
                }
                EngineAction::Report(report) => {
                    let line = report.render(&self.timezone);
                    info!("{line}");
                    if let Err(err) = self.bus.publish(&self.status_topic, &line) {
                        warn!("status report dropped: {err}");
                    }
                }
            }
        }
    }
}

/// Publishes the current report without running a tick.
pub async fn publish_report<B: MessageBus>(
    state: &SharedState,
    bus: &B,
    room: &str,
    timezone: &Tz,
) -> Result<(), BusError> {
    let line = state.engine.lock().await.report().render(timezone);
    bus.publish(&status_topic(room), &line)
}

/// Applies one text command from the room command topic. Malformed or
/// rejected commands leave the settings untouched.
pub async fn apply_remote_command(
    state: &SharedState,
    payload: &[u8],
) -> Result<RemoteCommand, CommandError> {
    let command = RemoteCommand::parse_payload(payload)
        .inspect_err(|err| warn!("ignoring remote command: {err}"))?;

    match command {
        RemoteCommand::Halt => {
            info!("halt requested");
            state.request_halt();
        }
        RemoteCommand::Set { key, value } => {
            state
                .engine
                .lock()
                .await
                .apply_setting(key, value)
                .inspect_err(|err| warn!("rejected remote setting: {err}"))?;
            info!("setting {} = {value}", key.as_str());
        }
    }
    Ok(command)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use hvac_common::{
        Actuator, CircuitConfig, RelayError, SensorError, SettingKey, Settings, Status,
    };
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Clone, Default)]
    struct Thermometer(Arc<StdMutex<Option<f32>>>);

    impl Thermometer {
        fn set(&self, celsius: Option<f32>) {
            *self.0.lock().unwrap() = celsius;
        }
    }

    impl SensorDriver for Thermometer {
        fn acquire(&mut self) -> Result<(f32, Option<f32>), SensorError> {
            let reading = *self.0.lock().unwrap();
            reading
                .map(|celsius| (celsius, Some(40.0)))
                .ok_or(SensorError::NoReading)
        }
    }

    #[derive(Clone, Default)]
    struct RecordingRelay {
        log: Arc<StdMutex<Vec<(Actuator, bool)>>>,
        stuck: bool,
    }

    impl RecordingRelay {
        fn log(&self) -> Vec<(Actuator, bool)> {
            self.log.lock().unwrap().clone()
        }
    }

    impl RelayDriver for RecordingRelay {
        fn set_circuit(&mut self, actuator: Actuator, energized: bool) -> Result<(), RelayError> {
            self.log.lock().unwrap().push((actuator, energized));
            if self.stuck {
                return Err(RelayError::Io {
                    circuit: actuator.as_str(),
                    source: std::io::Error::other("stuck contact"),
                });
            }
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingBus {
        published: Arc<StdMutex<Vec<(String, String)>>>,
    }

    impl RecordingBus {
        fn on_topic(&self, topic: &str) -> Vec<String> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .filter(|(published, _)| published == topic)
                .map(|(_, payload)| payload.clone())
                .collect()
        }
    }

    impl MessageBus for RecordingBus {
        fn publish(&self, topic: &str, payload: &str) -> Result<(), BusError> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string()));
            Ok(())
        }
    }

    struct Harness {
        controller: Controller<Thermometer, RecordingRelay, RecordingBus>,
        state: SharedState,
        thermometer: Thermometer,
        relay: RecordingRelay,
        bus: RecordingBus,
    }

    fn harness(relay: RecordingRelay) -> Harness {
        let engine =
            ThermostatEngine::new(Settings::default(), CircuitConfig::default(), Utc::now());
        let state = SharedState::new(engine);
        let thermometer = Thermometer::default();
        let bus = RecordingBus::default();
        let controller = Controller::new(
            state.clone(),
            SensorReader::new(thermometer.clone(), Duration::ZERO),
            relay.clone(),
            bus.clone(),
            "den",
            chrono_tz::UTC,
        );
        Harness {
            controller,
            state,
            thermometer,
            relay,
            bus,
        }
    }

    #[tokio::test]
    async fn warm_room_starts_cooling_and_reports() {
        let mut h = harness(RecordingRelay::default());
        h.thermometer.set(Some(25.0));

        h.controller.run_cycle().await.unwrap();

        assert_eq!(h.state.engine.lock().await.status(), Status::Cooling);
        assert_eq!(h.relay.log(), vec![(Actuator::Cool, true)]);
        let reports = h.bus.on_topic("smarter_circuits/thermostats/den/status");
        assert_eq!(reports.len(), 1);
        assert!(reports[0].starts_with("report: 77.0 F 40.0% AC:on"));
    }

    #[tokio::test]
    async fn setting_update_applies_on_next_tick() {
        let mut h = harness(RecordingRelay::default());
        h.thermometer.set(Some(25.0));

        let command = apply_remote_command(&h.state, b"temperature_high_setting:80")
            .await
            .unwrap();
        assert_eq!(
            command,
            RemoteCommand::Set {
                key: SettingKey::HighSetpoint,
                value: 80
            }
        );

        h.controller.run_cycle().await.unwrap();

        assert_eq!(h.state.engine.lock().await.settings().high_setpoint, 80);
        assert!(!h.relay.log().contains(&(Actuator::Cool, true)));
    }

    #[tokio::test]
    async fn malformed_command_changes_nothing() {
        let h = harness(RecordingRelay::default());

        assert!(apply_remote_command(&h.state, b"temperature_high_setting:warm")
            .await
            .is_err());
        assert!(apply_remote_command(&h.state, b"stage_limit_minutes:-5")
            .await
            .is_err());
        assert!(apply_remote_command(&h.state, b"").await.is_err());

        assert_eq!(*h.state.engine.lock().await.settings(), Settings::default());
        assert!(!h.state.is_halted());
    }

    #[tokio::test]
    async fn sensor_failure_marks_status_and_switches_off() {
        let mut h = harness(RecordingRelay::default());
        apply_remote_command(&h.state, b"failed_read_halt_limit:2")
            .await
            .unwrap();
        h.thermometer.set(None);

        h.controller.run_cycle().await.unwrap();

        assert_eq!(h.state.engine.lock().await.status(), Status::SensorFail);
        assert!(h.relay.log().iter().all(|(_, on)| !on));
        assert!(h
            .bus
            .on_topic(TOPIC_CIRCUIT_COMMAND)
            .contains(&"turn off whole house fan".to_string()));
    }

    #[tokio::test]
    async fn relay_faults_do_not_abort_the_tick() {
        let mut h = harness(RecordingRelay {
            stuck: true,
            ..RecordingRelay::default()
        });
        h.thermometer.set(Some(25.0));

        h.controller.run_cycle().await.unwrap();

        assert_eq!(h.relay.log(), vec![(Actuator::Cool, true)]);
        assert_eq!(
            h.bus
                .on_topic("smarter_circuits/thermostats/den/status")
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn halt_command_stops_loop_and_deenergizes() {
        let h = harness(RecordingRelay::default());
        h.thermometer.set(Some(25.0));
        let state = h.state.clone();
        let handle = tokio::spawn(h.controller.run(Duration::from_millis(10)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            apply_remote_command(&state, b"halt").await.unwrap(),
            RemoteCommand::Halt
        );
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("control loop did not stop")
            .unwrap();

        let engine = state.engine.lock().await;
        assert_eq!(engine.status(), Status::Halted);
        assert!(!engine.actuators().cool_on);
        let log = h.relay.log();
        assert_eq!(
            log[log.len() - 3..].to_vec(),
            vec![
                (Actuator::Heat, false),
                (Actuator::Cool, false),
                (Actuator::Fan, false)
            ]
        );
    }

    #[tokio::test]
    async fn periodic_report_publishes_current_state() {
        let h = harness(RecordingRelay::default());

        publish_report(&h.state, &h.bus, "den", &chrono_tz::UTC)
            .await
            .unwrap();

        let reports = h.bus.on_topic("smarter_circuits/thermostats/den/status");
        assert_eq!(reports.len(), 1);
        assert!(reports[0].contains("Status:loading"));
    }
}
