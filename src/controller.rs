//! Turn controller
//!
//! Drives one conversation at a time through
//! `Idle → WakeListening → Capturing → Transcribing → Generating → Speaking`
//! and back to `Idle`, with an `Aborted` exit from any non-idle phase.
//!
//! The controller is the only writer of emotion and activity in
//! [`SharedState`]. It holds the audio device only through [`AudioGate`]
//! leases, so every exit path returns the device. Shutdown is observed while
//! waiting for audio, between stages and before every retry; a request
//! already issued (including a wake phrase check) is allowed to finish.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::{AudioDevice, AudioGate, Capture, CaptureLimits, InputHandle, UtteranceRecorder};
use crate::dialogue::{DialogueGenerator, FALLBACK_REPLY};
use crate::emotion::{Emotion, Gesture, ParsedReply, parse_reply};
use crate::error::Service;
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownListener;
use crate::state::{Activity, SharedState, StateUpdate};
use crate::voice::{Synthesizer, Transcriber, WakeDetector};
use crate::{Error, Result};

/// Where the controller is in the current turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    WakeListening,
    Capturing,
    Transcribing,
    Generating,
    Speaking,
    Aborted,
}

/// Why a turn ended without a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Nothing was said, or nothing could be transcribed
    NoSpeech,
    /// Transcriber failed after retries
    Transcriber,
    /// Synthesizer failed after retries
    Synthesizer,
    /// Audio device failed or was unavailable
    Device,
    /// Shutdown was requested mid-turn
    Shutdown,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NoSpeech => "no speech",
            Self::Transcriber => "transcriber failed",
            Self::Synthesizer => "synthesizer failed",
            Self::Device => "audio device failed",
            Self::Shutdown => "shutting down",
        };
        f.write_str(reason)
    }
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// A reply was spoken (or playback was attempted)
    Spoken {
        emotion: Emotion,
        text: String,
        gesture: Gesture,
    },
    Aborted(AbortReason),
}

/// Result of one pass through the controller loop
#[derive(Debug, Clone, PartialEq)]
pub enum Cycle {
    /// A wake event was accepted and a turn ran to its end
    Turn(TurnOutcome),
    /// No turn ran (device busy, read error, or a wake event was ignored)
    Skipped,
    /// Shutdown was requested
    Stopped,
}

/// Network collaborators of a turn
#[derive(Clone)]
pub struct Services {
    pub transcriber: Arc<dyn Transcriber>,
    pub generator: Arc<dyn DialogueGenerator>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

/// Tunables for the turn loop
#[derive(Debug, Clone)]
pub struct TurnSettings {
    /// Language hint passed to the transcriber
    pub language: String,
    pub limits: CaptureLimits,
    pub retry: RetryPolicy,
    /// Tagged reply used when the generator cannot answer
    pub fallback_reply: String,
    /// Wait before retrying the device after a busy or failed acquire
    pub idle_backoff: Duration,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            language: "ko".to_string(),
            limits: CaptureLimits::default(),
            retry: RetryPolicy::default(),
            fallback_reply: FALLBACK_REPLY.to_string(),
            idle_backoff: Duration::from_millis(250),
        }
    }
}

/// The wake → listen → reply state machine
pub struct TurnController<D: AudioDevice, W: WakeDetector> {
    gate: AudioGate<D>,
    detector: W,
    services: Services,
    state: SharedState,
    settings: TurnSettings,
    phase: TurnPhase,
}

impl<D: AudioDevice, W: WakeDetector> TurnController<D, W> {
    pub fn new(
        gate: AudioGate<D>,
        detector: W,
        services: Services,
        state: SharedState,
        settings: TurnSettings,
    ) -> Self {
        Self {
            gate,
            detector,
            services,
            state,
            settings,
            phase: TurnPhase::Idle,
        }
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Run turns until shutdown is requested
    pub async fn run(mut self, mut shutdown: ShutdownListener) {
        tracing::info!(
            language = %self.settings.language,
            frame_length = self.detector.frame_length(),
            "turn controller started"
        );

        loop {
            match self.cycle(&mut shutdown).await {
                Cycle::Stopped => break,
                Cycle::Turn(outcome) => tracing::debug!(?outcome, "turn finished"),
                Cycle::Skipped => {}
            }
        }

        self.enter(TurnPhase::Idle);
        tracing::info!("turn controller stopped");
    }

    /// Listen for one wake event and run the turn it starts
    pub async fn cycle(&mut self, shutdown: &mut ShutdownListener) -> Cycle {
        if shutdown.is_triggered() {
            return Cycle::Stopped;
        }

        self.enter(TurnPhase::Idle);
        let mut input = match self.gate.acquire_input() {
            Ok(input) => input,
            Err(e) => {
                if matches!(e, Error::DeviceBusy(_)) {
                    tracing::debug!(error = %e, "audio device busy, waiting");
                } else {
                    tracing::warn!(error = %e, "cannot open audio input");
                }
                return self.back_off(shutdown).await;
            }
        };

        self.enter(TurnPhase::WakeListening);
        match self.wait_for_wake(&mut input, shutdown).await {
            Ok(()) => {}
            Err(Error::ShuttingDown) => return Cycle::Stopped,
            Err(e) => {
                tracing::warn!(error = %e, "wake listening failed");
                drop(input);
                self.detector.reset();
                return self.back_off(shutdown).await;
            }
        }

        if !self.on_wake_detected() {
            return Cycle::Skipped;
        }

        let outcome = self.converse(input, shutdown).await;
        self.finish_turn(&outcome);
        Cycle::Turn(outcome)
    }

    /// Accept a wake event
    ///
    /// Only a controller that is idle-listening starts a turn; a wake event
    /// in any other phase is ignored.
    pub fn on_wake_detected(&mut self) -> bool {
        if self.phase == TurnPhase::WakeListening {
            self.enter(TurnPhase::Capturing);
            true
        } else {
            tracing::debug!(phase = ?self.phase, "wake event ignored, turn in progress");
            false
        }
    }

    /// Feed frames to the detector until it fires
    ///
    /// Only the wait for audio races shutdown; a frame handed to the detector
    /// is always processed to completion.
    async fn wait_for_wake(
        &mut self,
        input: &mut InputHandle<D>,
        shutdown: &mut ShutdownListener,
    ) -> Result<()> {
        let len = self.detector.frame_length();
        loop {
            let frame = tokio::select! {
                biased;
                () = shutdown.wait() => return Err(Error::ShuttingDown),
                frame = input.read_frame(len) => frame?,
            };
            if self.detector.process(&frame).await? {
                return Ok(());
            }
        }
    }

    async fn converse(
        &mut self,
        input: InputHandle<D>,
        shutdown: &mut ShutdownListener,
    ) -> TurnOutcome {
        self.state
            .update(StateUpdate::new().activity(Activity::Listening));

        let sample_rate = input.sample_rate();
        let recorder = match self.record(input, shutdown).await {
            Ok(recorder) => recorder,
            Err(Error::ShuttingDown) => return TurnOutcome::Aborted(AbortReason::Shutdown),
            Err(e) => {
                tracing::warn!(error = %e, "utterance capture failed");
                return TurnOutcome::Aborted(AbortReason::Device);
            }
        };

        if !recorder.heard_speech() {
            tracing::info!("no speech after wake word");
            return TurnOutcome::Aborted(AbortReason::NoSpeech);
        }
        let pcm = recorder.finish();

        if shutdown.is_triggered() {
            return TurnOutcome::Aborted(AbortReason::Shutdown);
        }
        self.enter(TurnPhase::Transcribing);
        let transcript = match self.transcribe(&pcm, sample_rate, shutdown).await {
            Ok(text) => text,
            Err(Error::ShuttingDown) => return TurnOutcome::Aborted(AbortReason::Shutdown),
            Err(Error::NoSpeechDetected) => {
                tracing::info!("transcript empty");
                return TurnOutcome::Aborted(AbortReason::NoSpeech);
            }
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                return TurnOutcome::Aborted(AbortReason::Transcriber);
            }
        };
        tracing::info!(transcript = %transcript, "heard");

        if shutdown.is_triggered() {
            return TurnOutcome::Aborted(AbortReason::Shutdown);
        }
        self.enter(TurnPhase::Generating);
        let Ok(reply) = self.reply_to(&transcript, shutdown).await else {
            return TurnOutcome::Aborted(AbortReason::Shutdown);
        };

        if shutdown.is_triggered() {
            return TurnOutcome::Aborted(AbortReason::Shutdown);
        }
        self.speak(reply, shutdown).await
    }

    /// Record until the utterance limits are hit, then hand the device back
    async fn record(
        &self,
        mut input: InputHandle<D>,
        shutdown: &mut ShutdownListener,
    ) -> Result<UtteranceRecorder> {
        let mut recorder = UtteranceRecorder::new(&self.settings.limits, input.sample_rate());
        let len = self.detector.frame_length();

        loop {
            let frame = tokio::select! {
                biased;
                () = shutdown.wait() => return Err(Error::ShuttingDown),
                frame = input.read_frame(len) => frame?,
            };
            if recorder.push(&frame) == Capture::Done {
                break;
            }
        }

        self.gate.release(input);
        tracing::debug!(
            samples = recorder.len(),
            heard_speech = recorder.heard_speech(),
            "utterance captured"
        );
        Ok(recorder)
    }

    async fn transcribe(
        &self,
        pcm: &[i16],
        sample_rate: u32,
        shutdown: &mut ShutdownListener,
    ) -> Result<String> {
        let transcriber = &self.services.transcriber;
        let language = self.settings.language.as_str();

        let text = self
            .settings
            .retry
            .run(Service::Transcriber, shutdown, move || {
                transcriber.transcribe(pcm, sample_rate, language)
            })
            .await?;

        let text = text.trim();
        if text.is_empty() {
            return Err(Error::NoSpeechDetected);
        }
        Ok(text.to_string())
    }

    /// Generate a reply, falling back to the canned one on failure
    ///
    /// Only fails with [`Error::ShuttingDown`].
    async fn reply_to(
        &self,
        transcript: &str,
        shutdown: &mut ShutdownListener,
    ) -> Result<ParsedReply> {
        let generator = &self.services.generator;
        let snapshot = self.state.snapshot();
        let sensors = &snapshot.sensors;

        let raw = match self
            .settings
            .retry
            .run(Service::Generator, shutdown, move || {
                generator.generate(transcript, sensors)
            })
            .await
        {
            Ok(raw) => raw,
            Err(Error::ShuttingDown) => return Err(Error::ShuttingDown),
            Err(e) => {
                tracing::warn!(error = %e, "reply generation failed, using fallback");
                self.settings.fallback_reply.clone()
            }
        };

        let parsed = parse_reply(&raw);
        if parsed.text.is_empty() {
            tracing::warn!(raw = %raw, "reply had no text, using fallback");
            return Ok(parse_reply(&self.settings.fallback_reply));
        }
        Ok(parsed)
    }

    async fn speak(&mut self, reply: ParsedReply, shutdown: &mut ShutdownListener) -> TurnOutcome {
        let ParsedReply { emotion, text } = reply;
        let gesture = emotion.gesture();

        self.enter(TurnPhase::Speaking);
        self.state.update(
            StateUpdate::new()
                .emotion(emotion)
                .activity(Activity::Speaking),
        );
        tracing::info!(%emotion, ?gesture, text = %text, "speaking");

        let synthesizer = &self.services.synthesizer;
        let text_ref = text.as_str();
        let audio = match self
            .settings
            .retry
            .run(Service::Synthesizer, shutdown, move || {
                synthesizer.synthesize(text_ref)
            })
            .await
        {
            Ok(audio) => audio,
            Err(Error::ShuttingDown) => return TurnOutcome::Aborted(AbortReason::Shutdown),
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed");
                return TurnOutcome::Aborted(AbortReason::Synthesizer);
            }
        };

        if shutdown.is_triggered() {
            return TurnOutcome::Aborted(AbortReason::Shutdown);
        }

        let mut output = match self.gate.acquire_output() {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, "cannot open audio output");
                return TurnOutcome::Aborted(AbortReason::Device);
            }
        };

        if let Err(e) = output.play(&audio).await {
            tracing::warn!(error = %e, "playback failed");
        }
        self.gate.release(output);

        TurnOutcome::Spoken {
            emotion,
            text,
            gesture,
        }
    }

    /// Publish the end of a turn and re-arm wake detection
    fn finish_turn(&mut self, outcome: &TurnOutcome) {
        if let TurnOutcome::Aborted(reason) = outcome {
            self.enter(TurnPhase::Aborted);
            tracing::info!(%reason, "turn aborted");
        }
        self.state.update(StateUpdate::new().activity(Activity::Idle));
        self.detector.reset();
        self.enter(TurnPhase::Idle);
    }

    async fn back_off(&self, shutdown: &mut ShutdownListener) -> Cycle {
        tokio::select! {
            biased;
            () = shutdown.wait() => Cycle::Stopped,
            () = tokio::time::sleep(self.settings.idle_backoff) => Cycle::Skipped,
        }
    }

    fn enter(&mut self, phase: TurnPhase) {
        if self.phase != phase {
            tracing::debug!(from = ?self.phase, to = ?phase, "turn phase");
            self.phase = phase;
        }
    }
}
