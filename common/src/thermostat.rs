use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
    actuator::{ActuatorGuard, Transition},
    circulation::{CirculationTracker, VentilationMode, VentilationTracker, Window},
    config::{CircuitConfig, SettingKey, Settings},
    error::CommandError,
    report::StatusReport,
    staging::StageTracker,
    types::{Actuator, ActuatorState, Sample, Status, StatusPayload},
};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineAction {
    /// Drive a heat/cool/fan relay.
    Relay { actuator: Actuator, on: bool },
    /// Text command for a circuit on the shared circuit bus.
    Circuit { name: String, on: bool },
    Report(StatusReport),
}

impl EngineAction {
    pub fn circuit_command(name: &str, on: bool) -> String {
        if on {
            format!("turn on {name}")
        } else {
            format!("turn off {name}")
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThermostatEngine {
    settings: Settings,
    circuits: CircuitConfig,

    status: Status,
    temperature: Option<f32>,
    humidity: Option<f32>,

    guard: ActuatorGuard,
    stage: StageTracker,
    circulation: CirculationTracker,
    ventilation: VentilationTracker,
}

impl ThermostatEngine {
    pub fn new(settings: Settings, mut circuits: CircuitConfig, now: DateTime<Utc>) -> Self {
        circuits.sanitize();
        Self {
            settings,
            circuits,
            status: Status::Loading,
            temperature: None,
            humidity: None,
            guard: ActuatorGuard::new(now),
            stage: StageTracker::new(now),
            circulation: CirculationTracker::new(now),
            ventilation: VentilationTracker::new(now),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn actuators(&self) -> ActuatorState {
        self.guard.state()
    }

    pub fn stage(&self) -> &StageTracker {
        &self.stage
    }

    pub fn circulation(&self) -> &CirculationTracker {
        &self.circulation
    }

    pub fn ventilation(&self) -> &VentilationTracker {
        &self.ventilation
    }

    pub fn last_deactivation(&self) -> DateTime<Utc> {
        self.guard.last_deactivation()
    }

    pub fn apply_setting(&mut self, key: SettingKey, value: i64) -> Result<(), CommandError> {
        self.settings.apply(key, value)
    }

    /// De-energizes everything without touching the status. Used once at
    /// power-up so the relays start from a known state.
    pub fn initialize(&mut self, now: DateTime<Utc>) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        self.force_off(now, &mut actions);
        actions
    }

    pub fn halt(&mut self, now: DateTime<Utc>) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        self.status = Status::Halted;
        self.force_off(now, &mut actions);
        actions
    }

    /// One control decision. Rules are evaluated top to bottom and each
    /// terminal rule ends the tick; later rules assume earlier ones did not
    /// match.
    pub fn tick(&mut self, sample: Sample, now: DateTime<Utc>) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        self.temperature = sample.temperature;
        self.humidity = sample.humidity;

        let Some(temperature) = sample.usable_temperature() else {
            self.status = Status::SensorFail;
            self.force_off(now, &mut actions);
            return actions;
        };

        match self.circulation.window(now) {
            Window::Open => return actions,
            Window::Expired => {
                self.status = self.resting_status();
                self.stop_circulating(now, &mut actions);
                return actions;
            }
            Window::Idle => {}
        }

        match self.ventilation.window(now) {
            Window::Open => return actions,
            Window::Expired => {
                self.status = self.resting_status();
                self.stop_ventilating(now, &mut actions);
                return actions;
            }
            Window::Idle => {}
        }

        if self.stage.in_delay(now) {
            self.status = Status::Delayed;
            return actions;
        }

        if self.settings.is_disabled() {
            self.status = Status::Disabled;
            if self.guard.is_on(Actuator::Cool) {
                self.switch(Actuator::Cool, false, now, &mut actions);
            }
            if self.guard.is_on(Actuator::Heat) {
                self.switch(Actuator::Heat, false, now, &mut actions);
            }
            if self.circulation.is_circulating() {
                self.stop_circulating(now, &mut actions);
            }
            if self.ventilation.is_ventilating() {
                self.stop_ventilating(now, &mut actions);
            }
            return actions;
        }

        let rounded = round_temperature(temperature);
        let high = i64::from(self.settings.high_setpoint);
        let low = i64::from(self.settings.low_setpoint);
        let swing = i64::from(self.settings.swing_offset);
        let cool_on = self.guard.is_on(Actuator::Cool);
        let heat_on = self.guard.is_on(Actuator::Heat);

        if rounded > high && !cool_on {
            self.cool_down(temperature, now, &mut actions);
            return actions;
        }

        // Stay on through the swing band below the turn-on threshold.
        if rounded > high - swing && cool_on {
            self.cool_down(temperature, now, &mut actions);
            return actions;
        }

        if rounded < low && !heat_on {
            self.warm_up(now, &mut actions);
            return actions;
        }

        if rounded < low + swing && heat_on {
            self.warm_up(now, &mut actions);
            return actions;
        }

        if self.guard.is_on(Actuator::Heat) {
            self.switch(Actuator::Heat, false, now, &mut actions);
        }
        if self.guard.is_on(Actuator::Cool) {
            self.switch(Actuator::Cool, false, now, &mut actions);
        }

        if CirculationTracker::is_due(&self.settings, self.guard.last_deactivation(), now) {
            self.start_circulating(now, &mut actions);
            return actions;
        }

        self.status = Status::StandBy;
        actions
    }

    pub fn report(&self) -> StatusReport {
        let status = if self.settings.is_disabled() {
            Status::Disabled
        } else {
            self.status
        };

        StatusReport {
            temperature: self.temperature,
            humidity: self.humidity,
            actuators: self.guard.state(),
            status,
            stage_started_at: self.stage.stage_started_at(),
            last_deactivation: self.guard.last_deactivation(),
        }
    }

    pub fn status_payload(&self, room: &str, now: DateTime<Utc>) -> StatusPayload {
        let actuators = self.guard.state();
        let running = actuators.heat_on || actuators.cool_on;
        StatusPayload {
            room: room.to_string(),
            temperature: self.temperature,
            humidity: self.humidity,
            status: self.report().status.as_str(),
            cool_on: actuators.cool_on,
            heat_on: actuators.heat_on,
            fan_on: actuators.fan_on,
            whole_house_fan_on: actuators.whole_house_fan_on,
            shower_vent_on: actuators.shower_vent_on,
            circulating: self.circulation.is_circulating(),
            ventilating: self.ventilation.is_ventilating(),
            in_delay: self.stage.in_delay(now),
            delay_remaining_secs: self.stage.delay_remaining(now).num_seconds(),
            stage_runtime_secs: if running {
                self.stage.runtime(now).num_seconds()
            } else {
                0
            },
            stage_started_at: self.stage.stage_started_at().timestamp(),
            last_deactivation: self.guard.last_deactivation().timestamp(),
            system_disabled: self.settings.is_disabled(),
        }
    }

    fn cool_down(&mut self, temperature: f32, now: DateTime<Utc>, actions: &mut Vec<EngineAction>) {
        if self.guard.is_on(Actuator::Cool) {
            self.continue_stage(Actuator::Cool, Status::Cooling, now, actions);
            return;
        }
        if self.yield_air_handler(now, actions) {
            return;
        }

        // humidity_setpoint is advisory: a humid room does not start a
        // circulation cycle ahead of cooling.
        if let Some(mode) = self.ventilation.trigger(&self.settings, temperature) {
            self.start_ventilating(mode, now, actions);
        }
        // Cleared on every cooling start, so the once-per-cycle check above
        // only holds back a restart that happens while the flag is still set.
        self.ventilation.reset_cool_cycle();
        self.circulation.reset_cool_cycle();

        self.begin_stage(Actuator::Cool, Status::Cooling, now, actions);
    }

    fn warm_up(&mut self, now: DateTime<Utc>, actions: &mut Vec<EngineAction>) {
        if self.guard.is_on(Actuator::Heat) {
            self.continue_stage(Actuator::Heat, Status::Heating, now, actions);
            return;
        }
        if self.yield_air_handler(now, actions) {
            return;
        }

        self.begin_stage(Actuator::Heat, Status::Heating, now, actions);
    }

    /// Setpoints moved under a running stage: the other side of the air
    /// handler is switched off and gets the next tick. Returns whether the
    /// tick was spent.
    fn yield_air_handler(&mut self, now: DateTime<Utc>, actions: &mut Vec<EngineAction>) -> bool {
        let Some(running) = self.guard.state().exclusive_active() else {
            return false;
        };

        debug!("{} still running on demand reversal", running.as_str());
        self.status = Status::StandBy;
        self.switch(running, false, now, actions);
        if running == Actuator::Fan {
            self.circulation.cancel();
        }
        true
    }

    /// A stage only starts, and only reports itself, once the guard accepts
    /// the activation.
    fn begin_stage(
        &mut self,
        actuator: Actuator,
        running: Status,
        now: DateTime<Utc>,
        actions: &mut Vec<EngineAction>,
    ) {
        match self.guard.set(actuator, true, now) {
            Transition::Activated => {
                self.stage.start(now);
                self.status = running;
                actions.push(EngineAction::Relay { actuator, on: true });
                actions.push(EngineAction::Report(self.report()));
            }
            Transition::Rejected { blocking } => {
                warn!(
                    "refusing to energize {} while {} is on",
                    actuator.as_str(),
                    blocking.as_str()
                );
                self.status = self.resting_status();
            }
            Transition::Unchanged | Transition::Deactivated => {}
        }
    }

    fn continue_stage(
        &mut self,
        actuator: Actuator,
        running: Status,
        now: DateTime<Utc>,
        actions: &mut Vec<EngineAction>,
    ) {
        if !self
            .stage
            .limit_exceeded(now, self.settings.stage_limit_minutes)
        {
            self.status = running;
            return;
        }

        debug!(
            "{} stage exceeded {} min, cooling down for {} min",
            actuator.as_str(),
            self.settings.stage_limit_minutes,
            self.settings.stage_cooldown_minutes
        );
        self.stage
            .begin_cooldown(now, self.settings.stage_cooldown_minutes);
        self.status = Status::Delayed;
        self.switch(actuator, false, now, actions);
    }

    fn start_circulating(&mut self, now: DateTime<Utc>, actions: &mut Vec<EngineAction>) {
        if self.circulation.is_circulating() {
            return;
        }

        self.status = Status::Circulating;
        if !self.switch(Actuator::Fan, true, now, actions) {
            self.status = self.resting_status();
            return;
        }
        for name in self.circuits.extra_circulation.clone() {
            actions.push(EngineAction::Circuit { name, on: true });
        }
        self.circulation
            .begin(now, self.settings.circulation_duration_minutes);
    }

    fn stop_circulating(&mut self, now: DateTime<Utc>, actions: &mut Vec<EngineAction>) {
        self.switch(Actuator::Fan, false, now, actions);
        for name in self.circuits.extra_circulation.clone() {
            actions.push(EngineAction::Circuit { name, on: false });
        }
        self.circulation.finish();
    }

    fn start_ventilating(
        &mut self,
        mode: VentilationMode,
        now: DateTime<Utc>,
        actions: &mut Vec<EngineAction>,
    ) {
        if self.ventilation.is_ventilating() {
            return;
        }

        self.status = match mode {
            VentilationMode::Plain => Status::Ventilating,
            VentilationMode::Assisted => Status::AssistedVentilation,
        };

        self.guard.set(Actuator::WholeHouseFan, true, now);
        actions.push(EngineAction::Circuit {
            name: self.circuits.whole_house_fan.clone(),
            on: true,
        });
        for name in self.circuits.extra_ventilation.clone() {
            actions.push(EngineAction::Circuit { name, on: true });
        }
        if mode == VentilationMode::Assisted {
            self.guard.set(Actuator::ShowerVent, true, now);
            actions.push(EngineAction::Circuit {
                name: self.circuits.shower_vent.clone(),
                on: true,
            });
        }

        self.ventilation
            .begin(now, self.settings.ventilation_duration_minutes);
        actions.push(EngineAction::Report(self.report()));
    }

    fn stop_ventilating(&mut self, now: DateTime<Utc>, actions: &mut Vec<EngineAction>) {
        self.guard.set(Actuator::WholeHouseFan, false, now);
        actions.push(EngineAction::Circuit {
            name: self.circuits.whole_house_fan.clone(),
            on: false,
        });
        for name in self.circuits.extra_ventilation.clone() {
            actions.push(EngineAction::Circuit { name, on: false });
        }
        if self.guard.set(Actuator::ShowerVent, false, now).changed() {
            actions.push(EngineAction::Circuit {
                name: self.circuits.shower_vent.clone(),
                on: false,
            });
        }

        self.ventilation.finish();
        actions.push(EngineAction::Report(self.report()));
    }

    /// Routes one heat/cool/fan intent through the guard. Only a real change
    /// drives the relay and emits a report.
    fn switch(
        &mut self,
        actuator: Actuator,
        on: bool,
        now: DateTime<Utc>,
        actions: &mut Vec<EngineAction>,
    ) -> bool {
        match self.guard.set(actuator, on, now) {
            Transition::Unchanged => false,
            Transition::Rejected { blocking } => {
                warn!(
                    "refusing to energize {} while {} is on",
                    actuator.as_str(),
                    blocking.as_str()
                );
                false
            }
            Transition::Activated | Transition::Deactivated => {
                if actuator == Actuator::Cool && !on {
                    self.ventilation.reset_cool_cycle();
                    self.circulation.reset_cool_cycle();
                }
                actions.push(EngineAction::Relay { actuator, on });
                actions.push(EngineAction::Report(self.report()));
                true
            }
        }
    }

    fn force_off(&mut self, now: DateTime<Utc>, actions: &mut Vec<EngineAction>) {
        self.guard.force_all_off(now);
        self.circulation.cancel();
        self.ventilation.cancel();

        for actuator in Actuator::EXCLUSIVE {
            actions.push(EngineAction::Relay { actuator, on: false });
        }
        let circuits = std::iter::once(self.circuits.whole_house_fan.clone())
            .chain(self.circuits.extra_ventilation.iter().cloned())
            .chain(std::iter::once(self.circuits.shower_vent.clone()))
            .chain(self.circuits.extra_circulation.iter().cloned());
        for name in circuits {
            actions.push(EngineAction::Circuit { name, on: false });
        }
        actions.push(EngineAction::Report(self.report()));
    }

    fn resting_status(&self) -> Status {
        let actuators = self.guard.state();
        if actuators.cool_on {
            Status::Cooling
        } else if actuators.heat_on {
            Status::Heating
        } else {
            Status::StandBy
        }
    }
}

/// Nearest whole degree, ties to even.
fn round_temperature(temperature: f32) -> i64 {
    temperature.round_ties_even() as i64
}
