//! Shared test utilities
//!
//! Scripted stand-ins for the audio device, the wake detector and the
//! network services, so whole turns run without hardware or API keys.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use planty::audio::{AudioDevice, CaptureLimits};
use planty::dialogue::DialogueGenerator;
use planty::voice::{Synthesizer, Transcriber, WakeDetector};
use planty::{
    Error, Result, RetryPolicy, SensorReadings, Service, Services, SharedState, Shutdown,
    Snapshot, TurnSettings,
};

pub const SAMPLE_RATE: u32 = 16_000;
pub const FRAME: usize = 512;

/// A frame of constant amplitude
#[must_use]
pub fn frame(amplitude: i16) -> Vec<i16> {
    vec![amplitude; FRAME]
}

/// `count` frames of constant amplitude
#[must_use]
pub fn frames(amplitude: i16, count: usize) -> Vec<Vec<i16>> {
    (0..count).map(|_| frame(amplitude)).collect()
}

/// Fast settings: short captures, no retry delays
#[must_use]
pub fn fast_settings() -> TurnSettings {
    TurnSettings {
        limits: CaptureLimits {
            max_duration: Duration::from_secs(1),
            silence_duration: Duration::from_millis(100),
            silence_threshold: 300,
        },
        retry: RetryPolicy::immediate(2),
        idle_backoff: Duration::from_millis(5),
        ..TurnSettings::default()
    }
}

/// What the scripted device saw
#[derive(Debug, Default)]
pub struct DeviceLog {
    pub input_starts: usize,
    pub input_stops: usize,
    pub played: Vec<Vec<u8>>,
}

/// Audio device that replays scripted frames, then silence
pub struct ScriptedDevice {
    frames: VecDeque<Vec<i16>>,
    log: Arc<Mutex<DeviceLog>>,
    fail_playback: bool,
}

impl ScriptedDevice {
    #[must_use]
    pub fn new(frames: Vec<Vec<i16>>) -> (Self, Arc<Mutex<DeviceLog>>) {
        let log = Arc::new(Mutex::new(DeviceLog::default()));
        let device = Self {
            frames: frames.into(),
            log: Arc::clone(&log),
            fail_playback: false,
        };
        (device, log)
    }

    #[must_use]
    pub const fn failing_playback(mut self) -> Self {
        self.fail_playback = true;
        self
    }
}

#[async_trait(?Send)]
impl AudioDevice for ScriptedDevice {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn start_input(&mut self) -> Result<()> {
        self.log.lock().unwrap().input_starts += 1;
        Ok(())
    }

    fn stop_input(&mut self) {
        self.log.lock().unwrap().input_stops += 1;
    }

    async fn read_frame(&mut self, len: usize) -> Result<Vec<i16>> {
        if let Some(frame) = self.frames.pop_front() {
            tokio::task::yield_now().await;
            return Ok(frame);
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok(vec![0; len])
    }

    async fn play(&mut self, audio: &[u8]) -> Result<()> {
        self.log.lock().unwrap().played.push(audio.to_vec());
        if self.fail_playback {
            return Err(Error::Audio("speaker unplugged".to_string()));
        }
        Ok(())
    }
}

/// Detector that fires after a fixed number of frames
pub struct ScriptedDetector {
    fire_after: usize,
    seen: usize,
    pub resets: Arc<AtomicUsize>,
}

impl ScriptedDetector {
    #[must_use]
    pub fn new(fire_after: usize) -> Self {
        Self {
            fire_after,
            seen: 0,
            resets: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait(?Send)]
impl WakeDetector for ScriptedDetector {
    fn frame_length(&self) -> usize {
        FRAME
    }

    async fn process(&mut self, _frame: &[i16]) -> Result<bool> {
        self.seen += 1;
        Ok(self.seen >= self.fire_after)
    }

    fn reset(&mut self) {
        self.seen = 0;
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// Transcriber that answers from a queue and counts calls
///
/// Once the queue runs dry the last answer repeats.
pub struct QueuedTranscriber {
    answers: Mutex<VecDeque<Result<String>>>,
    stop_on_call: Mutex<Option<Shutdown>>,
    pub calls: AtomicUsize,
}

impl QueuedTranscriber {
    #[must_use]
    pub fn new(answers: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            stop_on_call: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    /// Request shutdown from inside every call, as a signal arriving mid-request
    pub fn trigger_on_call(&self, shutdown: &Shutdown) {
        *self.stop_on_call.lock().unwrap() = Some(shutdown.clone());
    }

    #[must_use]
    pub fn saying(text: &str) -> Arc<Self> {
        Self::new(vec![Ok(text.to_string())])
    }

    /// Every call fails with a retryable upstream error
    #[must_use]
    pub fn unavailable() -> Arc<Self> {
        Self::new(vec![Err(upstream(Service::Transcriber, 503))])
    }
}

#[async_trait]
impl Transcriber for QueuedTranscriber {
    async fn transcribe(&self, _pcm: &[i16], _sample_rate: u32, _language: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(shutdown) = self.stop_on_call.lock().unwrap().as_ref() {
            shutdown.trigger();
        }
        let mut answers = self.answers.lock().unwrap();
        if answers.len() > 1 {
            return answers.pop_front().unwrap();
        }
        match answers.front() {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(_)) => Err(upstream(Service::Transcriber, 503)),
            None => Ok(String::new()),
        }
    }
}

/// Generator that returns a fixed reply (or fails) and records its inputs
pub struct RecordingGenerator {
    reply: Option<String>,
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<(String, SensorReadings)>>,
}

impl RecordingGenerator {
    #[must_use]
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl DialogueGenerator for RecordingGenerator {
    async fn generate(&self, text: &str, sensors: &SensorReadings) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push((text.to_string(), *sensors));
        self.reply
            .clone()
            .ok_or_else(|| upstream(Service::Generator, 500))
    }
}

/// Synthesizer that records its input and the state visible while it runs
pub struct RecordingSynthesizer {
    state: SharedState,
    fail: bool,
    stop_on_call: Mutex<Option<Shutdown>>,
    pub texts: Mutex<Vec<String>>,
    pub during: Mutex<Vec<Snapshot>>,
}

impl RecordingSynthesizer {
    #[must_use]
    pub fn new(state: &SharedState) -> Arc<Self> {
        Arc::new(Self {
            state: state.clone(),
            fail: false,
            stop_on_call: Mutex::new(None),
            texts: Mutex::new(Vec::new()),
            during: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn failing(state: &SharedState) -> Arc<Self> {
        Arc::new(Self {
            state: state.clone(),
            fail: true,
            stop_on_call: Mutex::new(None),
            texts: Mutex::new(Vec::new()),
            during: Mutex::new(Vec::new()),
        })
    }

    /// Request shutdown from inside every call
    pub fn trigger_on_call(&self, shutdown: &Shutdown) {
        *self.stop_on_call.lock().unwrap() = Some(shutdown.clone());
    }
}

#[async_trait]
impl Synthesizer for RecordingSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if let Some(shutdown) = self.stop_on_call.lock().unwrap().as_ref() {
            shutdown.trigger();
        }
        self.texts.lock().unwrap().push(text.to_string());
        self.during.lock().unwrap().push(self.state.snapshot());
        if self.fail {
            return Err(upstream(Service::Synthesizer, 503));
        }
        Ok(b"ID3-fake-mp3".to_vec())
    }
}

/// Bundle fakes into the controller's service set
#[must_use]
pub fn services(
    transcriber: &Arc<QueuedTranscriber>,
    generator: &Arc<RecordingGenerator>,
    synthesizer: &Arc<RecordingSynthesizer>,
) -> Services {
    Services {
        transcriber: Arc::clone(transcriber) as Arc<dyn Transcriber>,
        generator: Arc::clone(generator) as Arc<dyn DialogueGenerator>,
        synthesizer: Arc::clone(synthesizer) as Arc<dyn Synthesizer>,
    }
}

fn upstream(service: Service, status: u16) -> Error {
    Error::Upstream {
        service,
        status: Some(status),
        message: "unavailable".to_string(),
    }
}
