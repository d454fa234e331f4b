//! Daemon - the main device service
//!
//! Wires the sensor sampler, status server and turn controller to one
//! shared state and one shutdown signal, then waits for all of them.

use std::sync::Arc;

use crate::api::{StatusPublisher, StatusServer};
use crate::audio::{AudioDevice, AudioGate, CpalDevice};
use crate::config::{Config, SttProviderKind, TtsProviderKind};
use crate::controller::{Services, TurnController};
use crate::dialogue::{DialogueGenerator, OpenAiChat};
use crate::sensors::{JsonFileSensors, SensorSampler, SensorSource, StaticSensors};
use crate::shutdown::Shutdown;
use crate::state::SharedState;
use crate::voice::{PhraseWakeDetector, SpeechToText, Synthesizer, TextToSpeech, Transcriber};
use crate::{Error, Result};

/// The Planty daemon - orchestrates sensors, status and voice
pub struct Daemon {
    config: Config,
    state: SharedState,
    shutdown: Shutdown,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: SharedState::new(),
            shutdown: Shutdown::new(),
        }
    }

    /// Handle for stopping the daemon from outside
    #[must_use]
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run the daemon until Ctrl-C or an explicit shutdown
    ///
    /// # Errors
    ///
    /// Returns error if the voice stack cannot be initialized
    #[allow(clippy::future_not_send)]
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            name = %self.config.device.name,
            port = self.config.server.port,
            voice = self.config.voice.enabled,
            "starting daemon"
        );

        // Set up shutdown signal
        let trigger = self.shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                trigger.trigger();
            }
        });

        let sampler = SensorSampler::new(
            build_sensor_source(&self.config),
            self.state.clone(),
            self.config.sensors.interval,
        );
        let sampler_task = tokio::spawn(sampler.run(self.shutdown.listener()));

        let server = StatusServer::new(
            StatusPublisher::new(self.state.clone()),
            self.config.server.port,
        )
        .static_dir(self.config.server.static_dir.clone());
        let server_task = server.spawn(self.shutdown.listener());

        // Run voice loop on main task (cpal streams aren't Send)
        let voice_result = if self.config.voice.enabled {
            self.run_voice_loop().await
        } else {
            tracing::info!("voice disabled - running in status-only mode");
            self.shutdown.listener().wait().await;
            Ok(())
        };

        // Whatever ended the voice loop, stop the other loops too
        self.shutdown.trigger();

        if let Err(e) = sampler_task.await {
            tracing::error!(error = %e, "sensor sampler task failed");
        }
        match server_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "status server failed"),
            Err(e) => tracing::error!(error = %e, "status server task failed"),
        }

        tracing::info!("daemon stopped");
        voice_result
    }

    #[allow(clippy::future_not_send)]
    async fn run_voice_loop(&self) -> Result<()> {
        let services = build_services(&self.config)?;

        // Segment limits follow the capture rate
        let device = CpalDevice::open(self.config.audio.sample_rate)?;
        let detector = PhraseWakeDetector::new(
            Arc::clone(&services.transcriber),
            self.config.device.wake_words.clone(),
            self.config.device.language.clone(),
            self.config.audio.frame_length,
            device.sample_rate(),
        )?;

        tracing::info!(
            wake_words = ?self.config.device.wake_words,
            "listening for wake word"
        );

        TurnController::new(
            AudioGate::new(device),
            detector,
            services,
            self.state.clone(),
            self.config.turn_settings(),
        )
        .run(self.shutdown.listener())
        .await;

        Ok(())
    }
}

/// Build the network collaborators from configuration
///
/// # Errors
///
/// Returns error if a required API key is missing
pub fn build_services(config: &Config) -> Result<Services> {
    let openai_key = config.openai_key()?;
    let generator: Arc<dyn DialogueGenerator> = Arc::new(OpenAiChat::new(
        openai_key,
        config.device.name.clone(),
        config.chat_settings(),
    )?);

    Ok(Services {
        transcriber: build_transcriber(config)?,
        generator,
        synthesizer: build_synthesizer(config)?,
    })
}

/// Build the configured speech-to-text client
///
/// # Errors
///
/// Returns error if the provider's API key is missing
pub fn build_transcriber(config: &Config) -> Result<Arc<dyn Transcriber>> {
    let voice = &config.voice;
    let stt = match voice.stt_provider {
        SttProviderKind::Whisper => SpeechToText::new_whisper(
            config.openai_key()?,
            voice.stt_model.clone(),
            config.llm.base_url.clone(),
            config.request_timeout,
        )?,
        SttProviderKind::Deepgram => SpeechToText::new_deepgram(
            required(config.api_keys.deepgram.as_ref(), "DEEPGRAM_API_KEY")?,
            voice.stt_model.clone(),
            config.request_timeout,
        )?,
    };
    Ok(Arc::new(stt))
}

/// Build the configured text-to-speech client
///
/// # Errors
///
/// Returns error if the provider's API key is missing
pub fn build_synthesizer(config: &Config) -> Result<Arc<dyn Synthesizer>> {
    let voice = &config.voice;
    let tts = match voice.tts_provider {
        TtsProviderKind::OpenAi => TextToSpeech::new_openai(
            config.openai_key()?,
            voice.tts_voice.clone(),
            voice.tts_speed,
            voice.tts_model.clone(),
            config.llm.base_url.clone(),
            config.request_timeout,
        )?,
        TtsProviderKind::ElevenLabs => TextToSpeech::new_elevenlabs(
            required(config.api_keys.elevenlabs.as_ref(), "ELEVENLABS_API_KEY")?,
            voice.tts_voice.clone(),
            voice.tts_model.clone(),
            config.request_timeout,
        )?,
    };
    Ok(Arc::new(tts))
}

/// Build the configured sensor source
#[must_use]
pub fn build_sensor_source(config: &Config) -> Box<dyn SensorSource> {
    match &config.sensors.file {
        Some(path) => {
            tracing::info!(path = %path.display(), "reading sensors from file");
            Box::new(JsonFileSensors::new(path.clone()))
        }
        None => {
            tracing::info!("using static sensor readings");
            Box::new(StaticSensors::default())
        }
    }
}

fn required(key: Option<&String>, name: &str) -> Result<String> {
    key.filter(|k| !k.is_empty())
        .cloned()
        .ok_or_else(|| Error::Config(format!("{name} is required")))
}
