//! Wake word detection
//!
//! Detects the wake phrase in the idle audio stream. Uses a hybrid approach:
//! local energy segmentation picks out short bursts of speech, and only a
//! completed segment is sent to the transcriber for a phrase check.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::stt::Transcriber;
use crate::audio::samples_for;
use crate::{Error, Result};

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to check
const MIN_SPEECH: Duration = Duration::from_millis(300);

/// Silence duration to consider end of segment
const SILENCE: Duration = Duration::from_millis(500);

/// Segments longer than this are not a wake phrase
const MAX_SEGMENT: Duration = Duration::from_secs(3);

/// Default frame size fed to the detector
pub const FRAME_LENGTH: usize = 512;

/// Consumes fixed-size frames and reports wake events
///
/// Not required to be `Send`; it runs on the controller's task alongside the
/// audio device.
#[async_trait(?Send)]
pub trait WakeDetector {
    /// Number of samples the detector expects per frame
    fn frame_length(&self) -> usize;

    /// Feed one frame; `true` means the wake word was heard
    ///
    /// # Errors
    ///
    /// Returns error if detection itself fails
    async fn process(&mut self, frame: &[i16]) -> Result<bool>;

    /// Drop any partially accumulated audio
    fn reset(&mut self);
}

/// State of the wake word detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Detected potential speech, accumulating
    Listening,
}

/// Segments speech by energy and checks each segment's transcript for a
/// wake phrase
pub struct PhraseWakeDetector {
    transcriber: Arc<dyn Transcriber>,
    wake_words: Vec<String>,
    language: String,
    frame_length: usize,
    sample_rate: u32,
    min_speech_samples: usize,
    silence_samples: usize,
    max_segment_samples: usize,
    state: DetectorState,
    speech_buffer: Vec<i16>,
    silence_counter: usize,
}

impl PhraseWakeDetector {
    /// Create a new wake word detector for frames captured at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if no usable wake word is given or the rate is zero
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        wake_words: Vec<String>,
        language: String,
        frame_length: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::WakeWord("sample rate must be positive".to_string()));
        }

        let normalized: Vec<String> = wake_words
            .into_iter()
            .map(|w| normalize(&w))
            .filter(|w| !w.is_empty())
            .collect();

        if normalized.is_empty() {
            return Err(Error::WakeWord("at least one wake word required".to_string()));
        }

        tracing::debug!(
            wake_words = ?normalized,
            sample_rate,
            "wake word detector initialized"
        );

        Ok(Self {
            transcriber,
            wake_words: normalized,
            language,
            frame_length: frame_length.max(1),
            sample_rate,
            min_speech_samples: samples_for(MIN_SPEECH, sample_rate),
            silence_samples: samples_for(SILENCE, sample_rate),
            max_segment_samples: samples_for(MAX_SEGMENT, sample_rate),
            state: DetectorState::Idle,
            speech_buffer: Vec::new(),
            silence_counter: 0,
        })
    }

    /// Feed a frame through the energy state machine
    ///
    /// Returns the segment once enough speech has been followed by silence.
    fn segment(&mut self, samples: &[i16]) -> Option<Vec<i16>> {
        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            DetectorState::Idle => {
                if is_speech {
                    self.state = DetectorState::Listening;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected, listening");
                }
            }
            DetectorState::Listening => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > self.silence_samples
                    && self.speech_buffer.len() > self.min_speech_samples
                {
                    tracing::debug!(
                        samples = self.speech_buffer.len(),
                        "speech segment complete"
                    );
                    let segment = std::mem::take(&mut self.speech_buffer);
                    self.reset();
                    return Some(segment);
                }

                // Too much silence without enough speech, or rambling on
                if self.silence_counter > self.silence_samples * 2
                    || self.speech_buffer.len() > self.max_segment_samples
                {
                    tracing::trace!("segment discarded");
                    self.reset();
                }
            }
        }

        None
    }

    /// Check if transcribed text contains a wake word
    #[must_use]
    pub fn matches(&self, transcript: &str) -> bool {
        let normalized = normalize(transcript);
        self.wake_words.iter().any(|w| normalized.contains(w.as_str()))
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }

    /// Get the configured wake words
    #[must_use]
    pub fn wake_words(&self) -> &[String] {
        &self.wake_words
    }
}

#[async_trait(?Send)]
impl WakeDetector for PhraseWakeDetector {
    fn frame_length(&self) -> usize {
        self.frame_length
    }

    async fn process(&mut self, frame: &[i16]) -> Result<bool> {
        let Some(segment) = self.segment(frame) else {
            return Ok(false);
        };

        // One attempt only; a missed wake word is cheaper than a stalled loop
        let transcript = match self
            .transcriber
            .transcribe(&segment, self.sample_rate, &self.language)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "wake phrase check failed");
                return Ok(false);
            }
        };

        if self.matches(&transcript) {
            tracing::info!(transcript = %transcript, "wake word detected");
            Ok(true)
        } else {
            tracing::debug!(transcript = %transcript, "no wake word in segment");
            Ok(false)
        }
    }

    fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }
}

/// Lowercase and strip punctuation so "Planty!" matches "planty"
fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Calculate RMS energy of audio samples, normalized to 0.0..=1.0
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let s = f32::from(s) / 32768.0;
            s * s
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}
