use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CommandError;

/// Remotely overridable control settings. Field names on the wire follow the
/// command keys accepted by the remote channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub failed_read_halt_limit: u32,
    #[serde(rename = "temperature_high_setting")]
    pub high_setpoint: i32,
    #[serde(rename = "temperature_low_setting")]
    pub low_setpoint: i32,
    /// Advisory only; humidity does not drive any decision.
    #[serde(rename = "humidity_setting")]
    pub humidity_setpoint: i32,
    #[serde(rename = "air_circulation_minutes")]
    pub air_circulation_interval_minutes: u32,
    #[serde(rename = "circulation_cycle_minutes")]
    pub circulation_duration_minutes: u32,
    #[serde(rename = "ventilation_cycle_minutes")]
    pub ventilation_duration_minutes: u32,
    pub stage_limit_minutes: u32,
    pub stage_cooldown_minutes: u32,
    pub use_whole_house_fan: i32,
    pub system_disabled: i32,
    #[serde(rename = "swing_temp_offset")]
    pub swing_offset: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            failed_read_halt_limit: 10,
            high_setpoint: 73,
            low_setpoint: 69,
            humidity_setpoint: 50,
            air_circulation_interval_minutes: 30,
            circulation_duration_minutes: 10,
            ventilation_duration_minutes: 10,
            stage_limit_minutes: 15,
            stage_cooldown_minutes: 5,
            use_whole_house_fan: 0,
            system_disabled: 0,
            swing_offset: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    FailedReadHaltLimit,
    HighSetpoint,
    LowSetpoint,
    HumiditySetpoint,
    AirCirculationInterval,
    CirculationDuration,
    VentilationDuration,
    StageLimit,
    StageCooldown,
    UseWholeHouseFan,
    SystemDisabled,
    SwingOffset,
}

impl SettingKey {
    pub const ALL: [SettingKey; 12] = [
        SettingKey::FailedReadHaltLimit,
        SettingKey::HighSetpoint,
        SettingKey::LowSetpoint,
        SettingKey::HumiditySetpoint,
        SettingKey::AirCirculationInterval,
        SettingKey::CirculationDuration,
        SettingKey::VentilationDuration,
        SettingKey::StageLimit,
        SettingKey::StageCooldown,
        SettingKey::UseWholeHouseFan,
        SettingKey::SystemDisabled,
        SettingKey::SwingOffset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FailedReadHaltLimit => "failed_read_halt_limit",
            Self::HighSetpoint => "temperature_high_setting",
            Self::LowSetpoint => "temperature_low_setting",
            Self::HumiditySetpoint => "humidity_setting",
            Self::AirCirculationInterval => "air_circulation_minutes",
            Self::CirculationDuration => "circulation_cycle_minutes",
            Self::VentilationDuration => "ventilation_cycle_minutes",
            Self::StageLimit => "stage_limit_minutes",
            Self::StageCooldown => "stage_cooldown_minutes",
            Self::UseWholeHouseFan => "use_whole_house_fan",
            Self::SystemDisabled => "system_disabled",
            Self::SwingOffset => "swing_temp_offset",
        }
    }
}

impl FromStr for SettingKey {
    type Err = CommandError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == key)
            .ok_or_else(|| CommandError::UnknownKey(key.to_string()))
    }
}

impl Settings {
    /// Overwrites one field. Durations and the retry limit reject negative
    /// values; every other field takes any `i32`.
    pub fn apply(&mut self, key: SettingKey, value: i64) -> Result<(), CommandError> {
        let signed = || {
            i32::try_from(value).map_err(|_| CommandError::OutOfRange {
                key: key.as_str(),
                value,
            })
        };
        let unsigned = || {
            u32::try_from(value).map_err(|_| CommandError::OutOfRange {
                key: key.as_str(),
                value,
            })
        };

        match key {
            SettingKey::FailedReadHaltLimit => self.failed_read_halt_limit = unsigned()?,
            SettingKey::HighSetpoint => self.high_setpoint = signed()?,
            SettingKey::LowSetpoint => self.low_setpoint = signed()?,
            SettingKey::HumiditySetpoint => self.humidity_setpoint = signed()?,
            SettingKey::AirCirculationInterval => {
                self.air_circulation_interval_minutes = unsigned()?
            }
            SettingKey::CirculationDuration => self.circulation_duration_minutes = unsigned()?,
            SettingKey::VentilationDuration => self.ventilation_duration_minutes = unsigned()?,
            SettingKey::StageLimit => self.stage_limit_minutes = unsigned()?,
            SettingKey::StageCooldown => self.stage_cooldown_minutes = unsigned()?,
            SettingKey::UseWholeHouseFan => self.use_whole_house_fan = signed()?,
            SettingKey::SystemDisabled => self.system_disabled = signed()?,
            SettingKey::SwingOffset => self.swing_offset = signed()?,
        }
        Ok(())
    }

    pub fn is_disabled(&self) -> bool {
        self.system_disabled > 0
    }

    pub fn whole_house_fan_enabled(&self) -> bool {
        self.use_whole_house_fan > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub tick_interval_ms: u64,
    pub report_interval_ms: u64,
    pub sensor_retry_backoff_ms: u64,
    pub http_port: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10_000,
            report_interval_ms: 60_000,
            sensor_retry_backoff_ms: 1_000,
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "192.168.1.200".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

/// Names of circuits switched by text command over the circuit bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    pub whole_house_fan: String,
    pub shower_vent: String,
    pub extra_ventilation: Vec<String>,
    pub extra_circulation: Vec<String>,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            whole_house_fan: "whole house fan".to_string(),
            shower_vent: "shower fan".to_string(),
            extra_ventilation: Vec::new(),
            extra_circulation: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub heat_pin: u32,
    pub cool_pin: u32,
    pub fan_pin: u32,
    /// Relay boards that energize on a low output.
    pub active_low: bool,
    /// When set, relays are driven through `<gpio_root>/gpio<pin>/value`.
    pub gpio_root: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            heat_pin: 4,
            cool_pin: 22,
            fan_pin: 6,
            active_low: true,
            gpio_root: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub room: Option<String>,
    pub timezone: String,
    pub settings: Settings,
    pub controller: ControllerConfig,
    pub network: NetworkConfig,
    pub circuits: CircuitConfig,
    pub relay: RelayConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            room: None,
            timezone: "America/Los_Angeles".to_string(),
            settings: Settings::default(),
            controller: ControllerConfig::default(),
            network: NetworkConfig::default(),
            circuits: CircuitConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn sanitize(&mut self) {
        self.tick_interval_ms = self.tick_interval_ms.clamp(1_000, 600_000);
        self.report_interval_ms = self.report_interval_ms.max(self.tick_interval_ms);
        self.sensor_retry_backoff_ms = self.sensor_retry_backoff_ms.min(30_000);
        if self.http_port == 0 {
            self.http_port = 8080;
        }
    }
}

impl CircuitConfig {
    pub fn sanitize(&mut self) {
        self.extra_ventilation.retain(|name| !name.trim().is_empty());
        self.extra_circulation.retain(|name| !name.trim().is_empty());
        if self.whole_house_fan.trim().is_empty() {
            self.whole_house_fan = Self::default().whole_house_fan;
        }
        if self.shower_vent.trim().is_empty() {
            self.shower_vent = Self::default().shower_vent;
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let mut config: Self = serde_json::from_slice(raw)?;
        config.sanitize();
        Ok(config)
    }

    pub fn sanitize(&mut self) {
        self.controller.sanitize();
        self.circuits.sanitize();
        if self.network.mqtt_port == 0 {
            self.network.mqtt_port = 1883;
        }
    }
}

/// Room name derived from a host name such as `thermopiden`.
pub fn room_from_hostname(hostname: &str) -> String {
    hostname.trim().replace("thermopi", "")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn wire_keys_round_trip_through_parse() {
        for key in SettingKey::ALL {
            assert_eq!(key.as_str().parse::<SettingKey>().ok(), Some(key));
        }
        assert!("temperature_high".parse::<SettingKey>().is_err());
    }

    #[test]
    fn apply_overwrites_named_field() {
        let mut settings = Settings::default();
        settings.apply(SettingKey::HighSetpoint, 80).unwrap();
        settings.apply(SettingKey::SystemDisabled, 1).unwrap();

        assert_eq!(settings.high_setpoint, 80);
        assert!(settings.is_disabled());
    }

    #[test]
    fn negative_duration_is_rejected_without_change() {
        let mut settings = Settings::default();
        let err = settings.apply(SettingKey::StageLimit, -5).unwrap_err();

        assert_eq!(
            err,
            CommandError::OutOfRange {
                key: "stage_limit_minutes",
                value: -5
            }
        );
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn settings_deserialize_from_wire_names() {
        let settings: Settings =
            serde_json::from_str(r#"{"temperature_high_setting": 76, "use_whole_house_fan": 1}"#)
                .unwrap();

        assert_eq!(settings.high_setpoint, 76);
        assert!(settings.whole_house_fan_enabled());
        assert_eq!(settings.low_setpoint, 69);
    }

    #[test]
    fn sanitize_drops_blank_circuits_and_bounds_tick() {
        let mut config = RuntimeConfig::default();
        config.controller.tick_interval_ms = 5;
        config.circuits.extra_ventilation = vec!["attic fan".to_string(), "  ".to_string()];
        config.sanitize();

        assert_eq!(config.controller.tick_interval_ms, 1_000);
        assert_eq!(config.circuits.extra_ventilation, vec!["attic fan".to_string()]);
    }

    #[test]
    fn partial_runtime_config_fills_defaults() {
        let config = RuntimeConfig::from_json(
            br#"{"room": "den", "settings": {"stage_limit_minutes": 20}, "controller": {"tick_interval_ms": 0}}"#,
        )
        .unwrap();

        assert_eq!(config.room.as_deref(), Some("den"));
        assert_eq!(config.settings.stage_limit_minutes, 20);
        assert_eq!(config.settings.high_setpoint, 73);
        assert_eq!(config.controller.tick_interval_ms, 1_000);
        assert_eq!(config.network.mqtt_port, 1883);
    }

    #[test]
    fn room_strips_host_prefix() {
        assert_eq!(room_from_hostname("thermopiden\n"), "den");
        assert_eq!(room_from_hostname("kitchen"), "kitchen");
    }
}
