pub mod actuator;
pub mod circulation;
pub mod config;
pub mod error;
pub mod ports;
pub mod remote;
pub mod report;
pub mod staging;
pub mod thermostat;
pub mod topics;
pub mod types;

pub use actuator::{ActuatorGuard, Transition};
pub use circulation::{CirculationTracker, VentilationMode, VentilationTracker, Window};
pub use config::{
    CircuitConfig, ControllerConfig, NetworkConfig, RelayConfig, RuntimeConfig, SettingKey,
    Settings,
};
pub use error::{BusError, CommandError, RelayError, SensorError};
pub use ports::{MessageBus, RelayDriver, SensorDriver};
pub use remote::RemoteCommand;
pub use report::StatusReport;
pub use staging::StageTracker;
pub use thermostat::{EngineAction, ThermostatEngine};
pub use topics::*;
pub use types::{Actuator, ActuatorState, Sample, Status, StatusPayload};
