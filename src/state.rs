//! Shared device state
//!
//! [`SharedState`] is the single owner of the device's live status. It is
//! cloned into every worker (controller, sensor sampler, status server) at
//! construction and only exposes [`SharedState::update`] and
//! [`SharedState::snapshot`]. The lock is held for the duration of a field
//! copy and never across an await point.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::emotion::Emotion;

/// What the audio device is being used for by the conversation
///
/// Capture and playback are mutually exclusive, so a single value replaces
/// two independent flags that could both be true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Activity {
    #[default]
    Idle,
    /// Capturing the user's utterance
    Listening,
    /// Playing back a reply
    Speaking,
}

/// Latest environmental readings
///
/// Every sensor is a field, so a reading can be overwritten but never removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    /// Relative humidity (%)
    pub humidity: f64,
    /// Temperature (°C)
    pub temperature: f64,
    /// Illuminance (lux)
    pub light: f64,
    /// Nutrient level (%)
    pub nutrients: f64,
}

/// Partial update applied atomically by [`SharedState::update`]
///
/// Fields left as `None` are not touched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[must_use]
pub struct StateUpdate {
    pub emotion: Option<Emotion>,
    pub activity: Option<Activity>,
    pub sensors: Option<SensorReadings>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn emotion(mut self, emotion: Emotion) -> Self {
        self.emotion = Some(emotion);
        self
    }

    pub const fn activity(mut self, activity: Activity) -> Self {
        self.activity = Some(activity);
        self
    }

    pub const fn sensors(mut self, sensors: SensorReadings) -> Self {
        self.sensors = Some(sensors);
        self
    }

    /// Whether this update names no field at all
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.emotion.is_none() && self.activity.is_none() && self.sensors.is_none()
    }
}

/// Immutable copy of the whole state taken under the lock
///
/// This is the only shape of device state ever exposed outward.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub emotion: Emotion,
    pub is_listening: bool,
    pub is_speaking: bool,
    pub sensors: SensorReadings,
    pub last_update: DateTime<Utc>,
    /// Number of updates applied so far
    pub revision: u64,
}

#[derive(Debug)]
struct DeviceState {
    emotion: Emotion,
    activity: Activity,
    sensors: SensorReadings,
    last_update: DateTime<Utc>,
    revision: u64,
}

impl DeviceState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            emotion: self.emotion,
            is_listening: self.activity == Activity::Listening,
            is_speaking: self.activity == Activity::Speaking,
            sensors: self.sensors,
            last_update: self.last_update,
            revision: self.revision,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: Mutex<DeviceState>,
    changes: watch::Sender<u64>,
}

/// Lock-protected device state shared by all workers
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<Inner>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    /// Create the state with neutral emotion, idle activity and zeroed sensors
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(DeviceState {
                    emotion: Emotion::Neutral,
                    activity: Activity::Idle,
                    sensors: SensorReadings::default(),
                    last_update: Utc::now(),
                    revision: 0,
                }),
                changes,
            }),
        }
    }

    /// Apply the fields named in `update` and stamp `last_update`
    ///
    /// All fields are written under one lock acquisition, so no snapshot can
    /// observe part of an update. Returns the state as it was right after
    /// this update was applied. An update naming no field changes nothing,
    /// so it neither bumps the revision nor wakes subscribers.
    pub fn update(&self, update: StateUpdate) -> Snapshot {
        if update.is_empty() {
            return self.snapshot();
        }

        let snapshot = {
            let mut state = self.lock();
            if let Some(emotion) = update.emotion {
                state.emotion = emotion;
            }
            if let Some(activity) = update.activity {
                state.activity = activity;
            }
            if let Some(sensors) = update.sensors {
                state.sensors = sensors;
            }
            state.last_update = Utc::now();
            state.revision += 1;
            state.snapshot()
        };

        self.inner.changes.send_replace(snapshot.revision);
        tracing::trace!(
            revision = snapshot.revision,
            emotion = %snapshot.emotion,
            listening = snapshot.is_listening,
            speaking = snapshot.is_speaking,
            "state updated"
        );
        snapshot
    }

    /// Copy every field atomically
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot()
    }

    /// Watch the revision counter; it changes after every update
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        // A panic while holding the lock cannot leave a half-written record:
        // every field assignment is a plain copy.
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
