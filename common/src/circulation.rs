use chrono::{DateTime, Duration, Utc};

use crate::{config::Settings, staging::minutes};

/// Where a timed fan window stands relative to `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Idle,
    Open,
    Expired,
}

fn window(active: bool, until: DateTime<Utc>, now: DateTime<Utc>) -> Window {
    if !active {
        Window::Idle
    } else if now > until {
        Window::Expired
    } else {
        Window::Open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CirculationTracker {
    circulating_until: DateTime<Utc>,
    is_circulating: bool,
    has_circulated_since_cool: bool,
}

impl CirculationTracker {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            circulating_until: now + Duration::minutes(1),
            is_circulating: false,
            has_circulated_since_cool: false,
        }
    }

    /// Standalone circulation is due once the air handler has rested for a
    /// full interval. A zero interval disables it.
    pub fn is_due(settings: &Settings, last_deactivation: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        settings.air_circulation_interval_minutes > 0
            && now >= last_deactivation + minutes(settings.air_circulation_interval_minutes)
    }

    pub fn is_circulating(&self) -> bool {
        self.is_circulating
    }

    pub fn has_circulated_since_cool(&self) -> bool {
        self.has_circulated_since_cool
    }

    pub fn circulating_until(&self) -> DateTime<Utc> {
        self.circulating_until
    }

    pub fn window(&self, now: DateTime<Utc>) -> Window {
        window(self.is_circulating, self.circulating_until, now)
    }

    pub fn begin(&mut self, now: DateTime<Utc>, duration_minutes: u32) {
        self.circulating_until = now + minutes(duration_minutes);
        self.is_circulating = true;
    }

    pub fn finish(&mut self) {
        self.is_circulating = false;
        self.has_circulated_since_cool = true;
    }

    pub fn cancel(&mut self) {
        self.is_circulating = false;
    }

    pub fn reset_cool_cycle(&mut self) {
        self.has_circulated_since_cool = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VentilationMode {
    Plain,
    /// Temperature is far enough over the setpoint to add the shower vent.
    Assisted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VentilationTracker {
    ventilating_until: DateTime<Utc>,
    is_ventilating: bool,
    has_ventilated_this_cool_cycle: bool,
}

impl VentilationTracker {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            ventilating_until: now + Duration::minutes(1),
            is_ventilating: false,
            has_ventilated_this_cool_cycle: false,
        }
    }

    /// Checked when a cooling stage is about to start. Compares the raw,
    /// unrounded temperature against the high setpoint.
    pub fn trigger(&self, settings: &Settings, temperature: f32) -> Option<VentilationMode> {
        if !settings.whole_house_fan_enabled() || self.has_ventilated_this_cool_cycle {
            return None;
        }

        let high = settings.high_setpoint as f32;
        if temperature > high + 3.0 {
            Some(VentilationMode::Assisted)
        } else if temperature > high + 2.0 {
            Some(VentilationMode::Plain)
        } else {
            None
        }
    }

    pub fn is_ventilating(&self) -> bool {
        self.is_ventilating
    }

    pub fn has_ventilated_this_cool_cycle(&self) -> bool {
        self.has_ventilated_this_cool_cycle
    }

    pub fn ventilating_until(&self) -> DateTime<Utc> {
        self.ventilating_until
    }

    pub fn window(&self, now: DateTime<Utc>) -> Window {
        window(self.is_ventilating, self.ventilating_until, now)
    }

    pub fn begin(&mut self, now: DateTime<Utc>, duration_minutes: u32) {
        self.ventilating_until = now + minutes(duration_minutes);
        self.is_ventilating = true;
    }

    pub fn finish(&mut self) {
        self.is_ventilating = false;
        self.has_ventilated_this_cool_cycle = true;
    }

    pub fn cancel(&mut self) {
        self.is_ventilating = false;
    }

    pub fn reset_cool_cycle(&mut self) {
        self.has_ventilated_this_cool_cycle = false;
    }
}
