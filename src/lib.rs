//! Planty - a talking plant companion
//!
//! This library provides the core functionality for the Planty device:
//! - Voice turns (wake word, capture, STT, reply generation, TTS)
//! - Emotion tagging of replies and the gesture each emotion maps to
//! - Periodic sensor sampling into one shared device state
//! - A status surface (HTTP + WebSocket) for a dashboard
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────────┐
//! │ Sensor       │   │ Turn          │   │ Status server    │
//! │ sampler      │   │ controller    │   │ /state /ws       │
//! └──────┬───────┘   └──────┬────────┘   └────────┬─────────┘
//!        │ sensors          │ emotion, activity   │ snapshots
//! ┌──────▼──────────────────▼─────────────────────▼─────────┐
//! │                     Shared state                         │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod audio;
pub mod config;
pub mod controller;
pub mod daemon;
pub mod dialogue;
pub mod emotion;
pub mod error;
pub mod retry;
pub mod sensors;
pub mod shutdown;
pub mod state;
pub mod voice;

pub use config::Config;
pub use controller::{AbortReason, Cycle, Services, TurnController, TurnOutcome, TurnSettings};
pub use daemon::Daemon;
pub use emotion::{Emotion, Gesture, ParsedReply, parse_reply};
pub use error::{Error, Result, Service};
pub use retry::RetryPolicy;
pub use shutdown::{Shutdown, ShutdownListener};
pub use state::{Activity, SensorReadings, SharedState, Snapshot, StateUpdate};
