//! Boundaries to the hardware and transport the engine never touches
//! directly. The engine only emits [`EngineAction`](crate::EngineAction)s;
//! the host executes them through these traits.

use crate::{
    error::{BusError, RelayError, SensorError},
    types::Actuator,
};

/// One raw acquisition attempt. Retrying is the reader's job, not the driver's.
pub trait SensorDriver: Send {
    /// Returns `(celsius, humidity_percent)`.
    fn acquire(&mut self) -> Result<(f32, Option<f32>), SensorError>;
}

pub trait RelayDriver: Send {
    fn set_circuit(&mut self, actuator: Actuator, energized: bool) -> Result<(), RelayError>;
}

pub trait MessageBus: Send + Sync {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), BusError>;
}

impl<T: SensorDriver + ?Sized> SensorDriver for Box<T> {
    fn acquire(&mut self) -> Result<(f32, Option<f32>), SensorError> {
        (**self).acquire()
    }
}

impl<T: RelayDriver + ?Sized> RelayDriver for Box<T> {
    fn set_circuit(&mut self, actuator: Actuator, energized: bool) -> Result<(), RelayError> {
        (**self).set_circuit(actuator, energized)
    }
}
