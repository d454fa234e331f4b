//! The physical audio device behind the gate

use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::capture::AudioCapture;
use super::playback::AudioPlayback;
use crate::{Error, Result};

/// Poll interval while waiting for the microphone to fill a frame
const FRAME_POLL: Duration = Duration::from_millis(10);

/// A microphone that has produced nothing for this long is considered stalled
const INPUT_STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// One microphone plus one speaker
///
/// Only ever touched through an [`AudioGate`](super::AudioGate) lease.
/// Not required to be `Send`: cpal streams are tied to the thread that
/// built them, so the controller drives the device from the main task.
#[async_trait(?Send)]
pub trait AudioDevice {
    /// Sample rate of input frames
    fn sample_rate(&self) -> u32;

    /// Open the input stream, discarding any stale audio
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be started
    fn start_input(&mut self) -> Result<()>;

    /// Close the input stream
    fn stop_input(&mut self);

    /// Wait for the next `len` samples of 16-bit mono PCM
    ///
    /// # Errors
    ///
    /// Returns error if the input stream fails or stalls
    async fn read_frame(&mut self, len: usize) -> Result<Vec<i16>>;

    /// Play encoded (MP3) audio to completion
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    async fn play(&mut self, audio: &[u8]) -> Result<()>;
}

/// Default cpal input and output devices
pub struct CpalDevice {
    capture: AudioCapture,
    playback: AudioPlayback,
}

impl CpalDevice {
    /// Open the default microphone and speaker
    ///
    /// # Errors
    ///
    /// Returns error if either device cannot be opened
    pub fn open(sample_rate: u32) -> Result<Self> {
        Ok(Self {
            capture: AudioCapture::new(sample_rate)?,
            playback: AudioPlayback::new()?,
        })
    }
}

#[async_trait(?Send)]
impl AudioDevice for CpalDevice {
    fn sample_rate(&self) -> u32 {
        self.capture.sample_rate()
    }

    fn start_input(&mut self) -> Result<()> {
        self.capture.start()
    }

    fn stop_input(&mut self) {
        self.capture.stop();
    }

    async fn read_frame(&mut self, len: usize) -> Result<Vec<i16>> {
        if !self.capture.is_capturing() {
            return Err(Error::Audio("input stream not started".to_string()));
        }

        let started = Instant::now();
        loop {
            if let Some(frame) = self.capture.take_frame(len) {
                return Ok(frame);
            }
            if started.elapsed() > INPUT_STALL_TIMEOUT {
                return Err(Error::Audio("input stream stalled".to_string()));
            }
            tokio::time::sleep(FRAME_POLL).await;
        }
    }

    async fn play(&mut self, audio: &[u8]) -> Result<()> {
        self.playback.play_mp3(audio).await
    }
}
