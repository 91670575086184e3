use chrono::{DateTime, Utc};

use crate::types::{Actuator, ActuatorState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Activated,
    Deactivated,
    Unchanged,
    Rejected { blocking: Actuator },
}

impl Transition {
    pub fn changed(self) -> bool {
        matches!(self, Self::Activated | Self::Deactivated)
    }
}

/// Owns the actuator state and refuses to energize two members of the
/// heat/cool/fan group at once.
#[derive(Debug, Clone)]
pub struct ActuatorGuard {
    state: ActuatorState,
    last_deactivation: DateTime<Utc>,
}

impl ActuatorGuard {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: ActuatorState::default(),
            last_deactivation: now,
        }
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn is_on(&self, actuator: Actuator) -> bool {
        self.state.is_on(actuator)
    }

    /// Last time heat, cool or fan went from on to off.
    pub fn last_deactivation(&self) -> DateTime<Utc> {
        self.last_deactivation
    }

    pub fn set(&mut self, actuator: Actuator, on: bool, now: DateTime<Utc>) -> Transition {
        if self.state.is_on(actuator) == on {
            return Transition::Unchanged;
        }

        if on && actuator.is_exclusive() {
            if let Some(blocking) = self.state.exclusive_active() {
                return Transition::Rejected { blocking };
            }
        }

        self.state.set(actuator, on);
        if on {
            Transition::Activated
        } else {
            if actuator.is_exclusive() {
                self.last_deactivation = now;
            }
            Transition::Deactivated
        }
    }

    /// Drops every actuator regardless of current state and returns what was
    /// on before.
    pub fn force_all_off(&mut self, now: DateTime<Utc>) -> ActuatorState {
        let previous = self.state;
        if previous.exclusive_active().is_some() {
            self.last_deactivation = now;
        }
        self.state = ActuatorState::default();
        previous
    }
}
