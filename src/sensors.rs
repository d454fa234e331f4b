//! Sensor sampling
//!
//! A [`SensorSampler`] polls one [`SensorSource`] on a fixed interval and
//! writes each reading into [`SharedState`]. A failed read keeps the last
//! good values; the sampler never stops on a read error.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::MissedTickBehavior;

use crate::shutdown::ShutdownListener;
use crate::state::{SensorReadings, SharedState, StateUpdate};
use crate::{Error, Result};

/// Readings reported before real hardware is attached
pub const STATIC_READINGS: SensorReadings = SensorReadings {
    humidity: 60.0,
    temperature: 25.0,
    light: 1000.0,
    nutrients: 70.0,
};

/// Something that can be asked for the current readings
#[async_trait]
pub trait SensorSource: Send {
    /// Read every sensor once
    ///
    /// # Errors
    ///
    /// Returns [`Error::SensorRead`] if the source cannot be read
    async fn read(&mut self) -> Result<SensorReadings>;
}

/// Fixed readings
#[derive(Debug, Clone, Copy)]
pub struct StaticSensors {
    readings: SensorReadings,
}

impl StaticSensors {
    #[must_use]
    pub const fn new(readings: SensorReadings) -> Self {
        Self { readings }
    }
}

impl Default for StaticSensors {
    fn default() -> Self {
        Self::new(STATIC_READINGS)
    }
}

#[async_trait]
impl SensorSource for StaticSensors {
    async fn read(&mut self) -> Result<SensorReadings> {
        Ok(self.readings)
    }
}

/// Any subset of readings, as written by an external collector
#[derive(Debug, Default, Deserialize)]
struct ReadingsPatch {
    humidity: Option<f64>,
    temperature: Option<f64>,
    light: Option<f64>,
    nutrients: Option<f64>,
}

impl ReadingsPatch {
    fn apply(self, base: SensorReadings) -> SensorReadings {
        SensorReadings {
            humidity: self.humidity.unwrap_or(base.humidity),
            temperature: self.temperature.unwrap_or(base.temperature),
            light: self.light.unwrap_or(base.light),
            nutrients: self.nutrients.unwrap_or(base.nutrients),
        }
    }
}

/// Readings taken from a JSON file rewritten by another process
///
/// Keys missing from the file keep their previous value.
#[derive(Debug)]
pub struct JsonFileSensors {
    path: PathBuf,
    last: SensorReadings,
}

impl JsonFileSensors {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last: STATIC_READINGS,
        }
    }
}

#[async_trait]
impl SensorSource for JsonFileSensors {
    async fn read(&mut self) -> Result<SensorReadings> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::SensorRead(format!("{}: {e}", self.path.display())))?;
        let patch: ReadingsPatch = serde_json::from_str(&raw)
            .map_err(|e| Error::SensorRead(format!("{}: {e}", self.path.display())))?;
        self.last = patch.apply(self.last);
        Ok(self.last)
    }
}

/// Periodically copies sensor readings into shared state
pub struct SensorSampler {
    source: Box<dyn SensorSource>,
    state: SharedState,
    interval: Duration,
}

impl SensorSampler {
    #[must_use]
    pub fn new(source: Box<dyn SensorSource>, state: SharedState, interval: Duration) -> Self {
        Self {
            source,
            state,
            interval: interval.max(Duration::from_millis(10)),
        }
    }

    /// Take one reading
    ///
    /// Returns `true` if the state was updated. On failure the previous
    /// readings stay in place.
    pub async fn sample_once(&mut self) -> bool {
        match self.source.read().await {
            Ok(readings) => {
                self.state.update(StateUpdate::new().sensors(readings));
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "sensor read failed, keeping last readings");
                false
            }
        }
    }

    /// Sample until shutdown is requested
    pub async fn run(mut self, mut shutdown: ShutdownListener) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "sensor sampler started"
        );

        loop {
            tokio::select! {
                biased;
                () = shutdown.wait() => break,
                _ = interval.tick() => {
                    self.sample_once().await;
                }
            }
        }

        tracing::info!("sensor sampler stopped");
    }
}
