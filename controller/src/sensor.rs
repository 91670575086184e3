use std::{path::PathBuf, time::Duration};

use hvac_common::{Sample, SensorDriver, SensorError};
use tracing::{debug, warn};

const CELSIUS_RANGE: std::ops::RangeInclusive<f32> = -40.0..=80.0;
const HUMIDITY_RANGE: std::ops::RangeInclusive<f32> = 0.0..=100.0;

/// Wraps a driver with the bounded retry the control loop expects: one
/// attempt plus up to `retry_limit` retries, sleeping `backoff` in between.
/// Each acquisition runs on the blocking pool.
pub struct SensorReader<D> {
    driver: Option<D>,
    backoff: Duration,
}

impl<D: SensorDriver + 'static> SensorReader<D> {
    pub fn new(driver: D, backoff: Duration) -> Self {
        Self {
            driver: Some(driver),
            backoff,
        }
    }

    pub async fn read(&mut self, retry_limit: u32) -> Sample {
        let mut failures = 0u32;
        loop {
            match self.acquire().await {
                Ok((celsius, humidity)) => {
                    let sample = Sample::from_celsius(celsius, humidity);
                    debug!(
                        "sensor sample {:?} F after {failures} retries",
                        sample.temperature
                    );
                    return sample;
                }
                Err(err) => {
                    failures += 1;
                    if failures > retry_limit {
                        warn!("sensor gave up after {failures} attempts: {err}");
                        return Sample::invalid();
                    }
                    debug!("sensor attempt {failures} failed: {err}");
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }

    async fn acquire(&mut self) -> Result<(f32, Option<f32>), SensorError> {
        let mut driver = self
            .driver
            .take()
            .ok_or_else(|| SensorError::Io("sensor driver lost".to_string()))?;
        let (driver, reading) = tokio::task::spawn_blocking(move || {
            let reading = driver.acquire();
            (driver, reading)
        })
        .await
        .map_err(|err| SensorError::Io(format!("sensor task failed: {err}")))?;
        self.driver = Some(driver);
        reading
    }
}

/// Slowly drifting reading for hosts without a sensor attached.
#[derive(Debug, Default)]
pub struct SimulatedDriver {
    step: u32,
}

impl SensorDriver for SimulatedDriver {
    fn acquire(&mut self) -> Result<(f32, Option<f32>), SensorError> {
        self.step = self.step.wrapping_add(1);
        let phase = (self.step % 24) as f32;
        let offset = if phase < 12.0 { phase } else { 24.0 - phase };
        Ok((21.5 + offset * 0.25, Some(45.0)))
    }
}

/// Reads `<celsius> [humidity]` from a text file, as written by an external
/// sensor daemon or a 1-wire sysfs bridge.
#[derive(Debug, Clone)]
pub struct FileDriver {
    path: PathBuf,
}

impl FileDriver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SensorDriver for FileDriver {
    fn acquire(&mut self) -> Result<(f32, Option<f32>), SensorError> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|err| SensorError::Io(format!("{}: {err}", self.path.display())))?;
        parse_reading(&raw)
    }
}

fn parse_reading(raw: &str) -> Result<(f32, Option<f32>), SensorError> {
    let mut fields = raw.split_whitespace();
    let celsius = fields
        .next()
        .ok_or(SensorError::NoReading)?
        .parse::<f32>()
        .map_err(|err| SensorError::OutOfRange(err.to_string()))?;
    if !celsius.is_finite() || !CELSIUS_RANGE.contains(&celsius) {
        return Err(SensorError::OutOfRange(format!("{celsius} C")));
    }

    let humidity = match fields.next() {
        Some(field) => {
            let humidity = field
                .parse::<f32>()
                .map_err(|err| SensorError::OutOfRange(err.to_string()))?;
            if !HUMIDITY_RANGE.contains(&humidity) {
                return Err(SensorError::OutOfRange(format!("{humidity}%")));
            }
            Some(humidity)
        }
        None => None,
    };

    Ok((celsius, humidity))
}
