//! Audio device plumbing
//!
//! Microphone capture, speaker playback, utterance recording, and the gate
//! that gives one caller at a time exclusive use of the device.

mod capture;
mod device;
mod gate;
mod playback;
mod utterance;

pub use capture::{AudioCapture, SAMPLE_RATE, pcm_to_wav, peak, rms};
pub use device::{AudioDevice, CpalDevice};
pub use gate::{AudioGate, InputHandle, OutputHandle, Released, Session};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, decode_mp3};
pub use utterance::{Capture, CaptureLimits, UtteranceRecorder};
pub(crate) use utterance::samples_for;
