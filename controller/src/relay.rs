use std::path::PathBuf;

use hvac_common::{Actuator, RelayConfig, RelayDriver, RelayError};
use tracing::{debug, info};

/// Stand-in for hosts without relay hardware; every command is logged.
#[derive(Debug, Default)]
pub struct LoggingRelay;

impl RelayDriver for LoggingRelay {
    fn set_circuit(&mut self, actuator: Actuator, energized: bool) -> Result<(), RelayError> {
        info!(
            "relay {} -> {}",
            actuator.as_str(),
            if energized { "on" } else { "off" }
        );
        Ok(())
    }
}

/// Drives heat/cool/fan relays through exported sysfs GPIO lines.
#[derive(Debug, Clone)]
pub struct SysfsGpioRelay {
    root: PathBuf,
    config: RelayConfig,
}

impl SysfsGpioRelay {
    pub fn new(root: impl Into<PathBuf>, config: RelayConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    fn pin(&self, actuator: Actuator) -> Option<u32> {
        match actuator {
            Actuator::Heat => Some(self.config.heat_pin),
            Actuator::Cool => Some(self.config.cool_pin),
            Actuator::Fan => Some(self.config.fan_pin),
            Actuator::WholeHouseFan | Actuator::ShowerVent => None,
        }
    }
}

impl RelayDriver for SysfsGpioRelay {
    fn set_circuit(&mut self, actuator: Actuator, energized: bool) -> Result<(), RelayError> {
        let Some(pin) = self.pin(actuator) else {
            debug!("{} has no local relay", actuator.as_str());
            return Ok(());
        };

        let level = if energized != self.config.active_low {
            "1"
        } else {
            "0"
        };
        let path = self.root.join(format!("gpio{pin}")).join("value");
        std::fs::write(&path, level).map_err(|source| RelayError::Io {
            circuit: actuator.as_str(),
            source,
        })?;
        debug!("gpio{pin} <- {level} ({})", actuator.as_str());
        Ok(())
    }
}
