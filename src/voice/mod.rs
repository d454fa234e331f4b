//! Voice services
//!
//! Wake word detection, speech-to-text and text-to-speech. Audio I/O lives
//! in [`crate::audio`].

mod stt;
mod tts;
mod wake_word;

pub use stt::{SpeechToText, Transcriber};
pub use tts::{Synthesizer, TextToSpeech};
pub use wake_word::{DetectorState, FRAME_LENGTH, PhraseWakeDetector, WakeDetector};
