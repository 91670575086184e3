use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actuator {
    Heat,
    Cool,
    Fan,
    WholeHouseFan,
    ShowerVent,
}

impl Actuator {
    /// The heat/cool/fan group shares one air handler; only one may run.
    pub const EXCLUSIVE: [Actuator; 3] = [Actuator::Heat, Actuator::Cool, Actuator::Fan];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::Fan => "fan",
            Self::WholeHouseFan => "whole_house_fan",
            Self::ShowerVent => "shower_vent",
        }
    }

    pub fn is_exclusive(self) -> bool {
        Self::EXCLUSIVE.contains(&self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Loading,
    SensorFail,
    Halted,
    Delayed,
    Disabled,
    Cooling,
    Heating,
    Circulating,
    Ventilating,
    AssistedVentilation,
    StandBy,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::SensorFail => "sensor_fail",
            Self::Halted => "halted",
            Self::Delayed => "delayed",
            Self::Disabled => "disabled",
            Self::Cooling => "cooling",
            Self::Heating => "heating",
            Self::Circulating => "circulating",
            Self::Ventilating => "ventilating",
            Self::AssistedVentilation => "assisted_ventilation",
            Self::StandBy => "stand_by",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One acquisition result. Temperature is in °F, humidity in %.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub valid: bool,
}

impl Sample {
    pub fn new(temperature_f: f32, humidity: Option<f32>) -> Self {
        Self {
            temperature: Some(temperature_f),
            humidity,
            valid: true,
        }
    }

    pub fn from_celsius(temperature_c: f32, humidity: Option<f32>) -> Self {
        Self::new(temperature_c * 9.0 / 5.0 + 32.0, humidity)
    }

    pub fn invalid() -> Self {
        Self {
            temperature: None,
            humidity: None,
            valid: false,
        }
    }

    /// Temperature usable for decisions. A reading of exactly zero is treated
    /// as a failed acquisition.
    pub fn usable_temperature(&self) -> Option<f32> {
        if !self.valid {
            return None;
        }
        self.temperature.filter(|t| t.is_finite() && *t != 0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActuatorState {
    pub heat_on: bool,
    pub cool_on: bool,
    pub fan_on: bool,
    pub whole_house_fan_on: bool,
    pub shower_vent_on: bool,
}

impl ActuatorState {
    pub fn is_on(&self, actuator: Actuator) -> bool {
        match actuator {
            Actuator::Heat => self.heat_on,
            Actuator::Cool => self.cool_on,
            Actuator::Fan => self.fan_on,
            Actuator::WholeHouseFan => self.whole_house_fan_on,
            Actuator::ShowerVent => self.shower_vent_on,
        }
    }

    pub(crate) fn set(&mut self, actuator: Actuator, on: bool) {
        match actuator {
            Actuator::Heat => self.heat_on = on,
            Actuator::Cool => self.cool_on = on,
            Actuator::Fan => self.fan_on = on,
            Actuator::WholeHouseFan => self.whole_house_fan_on = on,
            Actuator::ShowerVent => self.shower_vent_on = on,
        }
    }

    pub fn exclusive_active(&self) -> Option<Actuator> {
        Actuator::EXCLUSIVE
            .into_iter()
            .find(|actuator| self.is_on(*actuator))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusPayload {
    pub room: String,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub status: &'static str,
    #[serde(rename = "coolOn")]
    pub cool_on: bool,
    #[serde(rename = "heatOn")]
    pub heat_on: bool,
    #[serde(rename = "fanOn")]
    pub fan_on: bool,
    #[serde(rename = "wholeHouseFanOn")]
    pub whole_house_fan_on: bool,
    #[serde(rename = "showerVentOn")]
    pub shower_vent_on: bool,
    pub circulating: bool,
    pub ventilating: bool,
    #[serde(rename = "inDelay")]
    pub in_delay: bool,
    #[serde(rename = "delayRemainingSecs")]
    pub delay_remaining_secs: i64,
    #[serde(rename = "stageRuntimeSecs")]
    pub stage_runtime_secs: i64,
    #[serde(rename = "stageStartedAt")]
    pub stage_started_at: i64,
    #[serde(rename = "lastDeactivation")]
    pub last_deactivation: i64,
    #[serde(rename = "systemDisabled")]
    pub system_disabled: bool,
}
