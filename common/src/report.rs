use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};

use crate::types::{ActuatorState, Status};

const REPORT_TIME_FORMAT: &str = "%m/%d/%Y, %H:%M:%S";

/// Point-in-time snapshot rendered as the single-line status report.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub actuators: ActuatorState,
    pub status: Status,
    pub stage_started_at: DateTime<Utc>,
    pub last_deactivation: DateTime<Utc>,
}

impl StatusReport {
    pub fn render<Tz>(&self, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        format!(
            "report: {:.1} F {:.1}% AC:{} Fan:{} Heat:{} WHF:{} Status:{} Last Start:{} Last Circ:{}",
            self.temperature.unwrap_or(0.0),
            self.humidity.unwrap_or(0.0),
            on_off(self.actuators.cool_on),
            on_off(self.actuators.fan_on),
            on_off(self.actuators.heat_on),
            on_off(self.actuators.whole_house_fan_on),
            self.status,
            self.stage_started_at
                .with_timezone(tz)
                .format(REPORT_TIME_FORMAT),
            self.last_deactivation
                .with_timezone(tz)
                .format(REPORT_TIME_FORMAT),
        )
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}
