use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("expected `key:value`, got {0:?}")]
    Malformed(String),
    #[error("unknown setting key {0:?}")]
    UnknownKey(String),
    #[error("value {value:?} for {key} is not an integer")]
    NotAnInteger { key: &'static str, value: String },
    #[error("value {value} is out of range for {key}")]
    OutOfRange { key: &'static str, value: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("sensor returned no reading")]
    NoReading,
    #[error("sensor reading out of range: {0}")]
    OutOfRange(String),
    #[error("sensor i/o failed: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay {circuit} write failed: {source}")]
    Io {
        circuit: &'static str,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
}
