//! Configuration management for Planty
//!
//! Every value resolves as environment variable > TOML file > built-in
//! default.

pub mod file;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::audio::{CaptureLimits, SAMPLE_RATE};
use crate::controller::TurnSettings;
use crate::dialogue::{ChatSettings, FALLBACK_REPLY};
use crate::retry::RetryPolicy;
use crate::voice::FRAME_LENGTH;
use crate::{Error, Result};

use self::file::PlantyConfigFile;

/// Default status server port
pub const DEFAULT_PORT: u16 = 5000;

/// Default chat model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default OpenAI-compatible API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Planty configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub device: DeviceConfig,
    pub audio: AudioConfig,
    pub sensors: SensorsConfig,
    pub retry: RetryPolicy,
    pub voice: VoiceConfig,
    pub llm: LlmConfig,
    pub api_keys: ApiKeys,
    pub server: ServerConfig,

    /// Timeout applied to every network request
    pub request_timeout: Duration,

    /// Tagged reply spoken when the generator fails
    pub fallback_reply: String,
}

/// Device identity
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Name used in the persona prompt
    pub name: String,
    /// Phrases that start a turn
    pub wake_words: Vec<String>,
    /// Transcription language hint
    pub language: String,
}

/// Microphone and capture limits
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Samples per wake detector frame
    pub frame_length: usize,
    pub capture_secs: f64,
    /// Peak i16 amplitude below which a frame is silent
    pub silence_threshold: u16,
    pub silence_secs: f64,
}

/// Sensor sampling
#[derive(Debug, Clone)]
pub struct SensorsConfig {
    pub interval: Duration,
    /// JSON file with live readings; static readings when `None`
    pub file: Option<PathBuf>,
}

/// Speech-to-text backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttProviderKind {
    Whisper,
    Deepgram,
}

/// Text-to-speech backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProviderKind {
    OpenAi,
    ElevenLabs,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable the voice loop
    pub enabled: bool,

    pub stt_provider: SttProviderKind,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    pub tts_provider: TtsProviderKind,

    /// TTS model (e.g. "tts-1", "eleven_multilingual_v2")
    pub tts_model: String,

    /// TTS voice identifier (ElevenLabs voice ID for that provider)
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,
}

/// Chat model configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// OpenAI-compatible base URL, shared by chat, Whisper and speech
    pub base_url: String,
}

/// API keys
#[derive(Clone, Default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("ApiKeys")
            .field("openai", &redact(&self.openai))
            .field("deepgram", &redact(&self.deepgram))
            .field("elevenlabs", &redact(&self.elevenlabs))
            .finish()
    }
}

/// Status server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Path to static files directory (dashboard)
    pub static_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a resolved value is out of range
    pub fn load() -> Result<Self> {
        Self::load_with_options(false)
    }

    /// Load configuration with explicit voice disable option
    ///
    /// # Errors
    ///
    /// Returns error if a resolved value is out of range
    pub fn load_with_options(disable_voice: bool) -> Result<Self> {
        let fc = file::load_config_file();
        let mut config = Self::resolve(fc, |key| std::env::var(key).ok())?;

        if disable_voice {
            config.voice.enabled = false;
            tracing::info!("voice explicitly disabled via --disable-voice");
        }

        Ok(config)
    }

    /// Resolve every value from `env` (first), then `fc`, then defaults
    ///
    /// # Errors
    ///
    /// Returns error if a resolved value is out of range or a provider name
    /// is unknown
    #[allow(clippy::too_many_lines)]
    pub fn resolve(fc: PlantyConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let flag = |key: &str| env(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"));

        // Device (env > toml > default)
        let device = DeviceConfig {
            name: env("PLANTY_NAME")
                .or(fc.device.name)
                .unwrap_or_else(|| "Planty".to_string()),
            wake_words: env("PLANTY_WAKE_WORDS")
                .map(|v| v.split(',').map(|w| w.trim().to_string()).collect())
                .or(fc.device.wake_words)
                .unwrap_or_else(|| vec!["플랜티".to_string(), "planty".to_string()]),
            language: env("PLANTY_LANGUAGE")
                .or(fc.device.language)
                .unwrap_or_else(|| "ko".to_string()),
        };

        let audio = AudioConfig {
            sample_rate: parse_env(&env, "PLANTY_SAMPLE_RATE")
                .or(fc.audio.sample_rate)
                .unwrap_or(SAMPLE_RATE),
            frame_length: parse_env(&env, "PLANTY_FRAME_LENGTH")
                .or(fc.audio.frame_length)
                .unwrap_or(FRAME_LENGTH),
            capture_secs: parse_env(&env, "PLANTY_CAPTURE_SECS")
                .or(fc.audio.capture_secs)
                .unwrap_or(5.0),
            silence_threshold: parse_env(&env, "PLANTY_SILENCE_THRESHOLD")
                .or(fc.audio.silence_threshold)
                .unwrap_or(300),
            silence_secs: parse_env(&env, "PLANTY_SILENCE_SECS")
                .or(fc.audio.silence_secs)
                .unwrap_or(1.5),
        };

        let sensors = SensorsConfig {
            interval: Duration::from_millis(
                parse_env(&env, "PLANTY_SENSOR_INTERVAL_MS")
                    .or(fc.sensors.interval_ms)
                    .unwrap_or(1000),
            ),
            file: env("PLANTY_SENSOR_FILE")
                .or(fc.sensors.file)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        };

        let retry = RetryPolicy {
            max_attempts: parse_env(&env, "PLANTY_RETRY_ATTEMPTS")
                .or(fc.retry.max_attempts)
                .unwrap_or(3),
            base_delay: Duration::from_millis(
                parse_env(&env, "PLANTY_RETRY_BASE_DELAY_MS")
                    .or(fc.retry.base_delay_ms)
                    .unwrap_or(500),
            ),
            max_delay: Duration::from_millis(
                parse_env(&env, "PLANTY_RETRY_MAX_DELAY_MS")
                    .or(fc.retry.max_delay_ms)
                    .unwrap_or(4000),
            ),
        };

        // Voice config (env > toml > provider default)
        let stt_provider = match env("PLANTY_STT_PROVIDER")
            .or(fc.voice.stt_provider)
            .as_deref()
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            None | Some("whisper" | "openai") => SttProviderKind::Whisper,
            Some("deepgram") => SttProviderKind::Deepgram,
            Some(other) => {
                return Err(Error::Config(format!("unknown STT provider: {other}")));
            }
        };
        let tts_provider = match env("PLANTY_TTS_PROVIDER")
            .or(fc.voice.tts_provider)
            .as_deref()
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            None | Some("openai") => TtsProviderKind::OpenAi,
            Some("elevenlabs") => TtsProviderKind::ElevenLabs,
            Some(other) => {
                return Err(Error::Config(format!("unknown TTS provider: {other}")));
            }
        };

        let voice = VoiceConfig {
            enabled: flag("PLANTY_VOICE_ENABLED")
                .or(fc.voice.enabled)
                .unwrap_or(true),
            stt_provider,
            stt_model: env("PLANTY_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| match stt_provider {
                    SttProviderKind::Whisper => "whisper-1".to_string(),
                    SttProviderKind::Deepgram => "nova-2".to_string(),
                }),
            tts_provider,
            tts_model: env("PLANTY_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| match tts_provider {
                    TtsProviderKind::OpenAi => "tts-1".to_string(),
                    TtsProviderKind::ElevenLabs => "eleven_multilingual_v2".to_string(),
                }),
            tts_voice: env("PLANTY_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| "nova".to_string()),
            tts_speed: parse_env(&env, "PLANTY_TTS_SPEED")
                .or(fc.voice.tts_speed)
                .unwrap_or(1.0),
        };

        let llm = LlmConfig {
            model: env("PLANTY_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: parse_env(&env, "PLANTY_LLM_TEMPERATURE")
                .or(fc.llm.temperature)
                .unwrap_or(0.7),
            max_tokens: parse_env(&env, "PLANTY_LLM_MAX_TOKENS")
                .or(fc.llm.max_tokens)
                .unwrap_or(100),
            base_url: env("OPENAI_BASE_URL")
                .or(fc.llm.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        };

        // API keys (env > toml > None)
        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai),
            deepgram: env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram),
            elevenlabs: env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs),
        };

        let server = ServerConfig {
            port: parse_env(&env, "PLANTY_PORT")
                .or_else(|| parse_env(&env, "PORT"))
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
            static_dir: env("PLANTY_STATIC_DIR")
                .or(fc.server.static_dir)
                .map(PathBuf::from),
        };

        let config = Self {
            device,
            audio,
            sensors,
            retry,
            voice,
            llm,
            api_keys,
            server,
            request_timeout: Duration::from_secs(
                parse_env(&env, "PLANTY_REQUEST_TIMEOUT_SECS")
                    .or(fc.request_timeout_secs)
                    .unwrap_or(20),
            ),
            fallback_reply: fc
                .fallback_reply
                .unwrap_or_else(|| FALLBACK_REPLY.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the audio pipeline cannot work with
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first bad value
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be positive".to_string()));
        }
        if self.audio.frame_length == 0 {
            return Err(Error::Config("frame_length must be positive".to_string()));
        }
        if !(self.audio.capture_secs > 0.0 && self.audio.capture_secs.is_finite()) {
            return Err(Error::Config("capture_secs must be positive".to_string()));
        }
        if !(self.audio.silence_secs >= 0.0 && self.audio.silence_secs.is_finite()) {
            return Err(Error::Config("silence_secs must not be negative".to_string()));
        }
        if self.device.wake_words.iter().all(|w| w.trim().is_empty()) {
            return Err(Error::Config("at least one wake word required".to_string()));
        }
        if !(0.25..=4.0).contains(&self.voice.tts_speed) {
            return Err(Error::Config(format!(
                "tts_speed {} out of range (0.25 to 4.0)",
                self.voice.tts_speed
            )));
        }
        Ok(())
    }

    /// Utterance capture limits
    #[must_use]
    pub fn capture_limits(&self) -> CaptureLimits {
        CaptureLimits {
            max_duration: Duration::from_secs_f64(self.audio.capture_secs),
            silence_duration: Duration::from_secs_f64(self.audio.silence_secs),
            silence_threshold: self.audio.silence_threshold,
        }
    }

    /// Settings for the turn controller
    #[must_use]
    pub fn turn_settings(&self) -> TurnSettings {
        TurnSettings {
            language: self.device.language.clone(),
            limits: self.capture_limits(),
            retry: self.retry.clone(),
            fallback_reply: self.fallback_reply.clone(),
            ..TurnSettings::default()
        }
    }

    /// Settings for the chat client
    #[must_use]
    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            model: self.llm.model.clone(),
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
            base_url: self.llm.base_url.clone(),
            timeout: self.request_timeout,
        }
    }

    /// OpenAI key, required by the default voice stack
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `OPENAI_API_KEY` is not set
    pub fn openai_key(&self) -> Result<String> {
        self.api_keys
            .openai
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is required for voice".to_string()))
    }
}

/// Parse a variable, treating unparsable values as unset
fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    let value = raw.trim().parse().ok();
    if value.is_none() {
        tracing::warn!(key, value = %raw, "ignoring unparsable environment variable");
    }
    value
}
