//! TOML configuration file loading
//!
//! Supports `~/.config/planty/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct PlantyConfigFile {
    /// Device identity and wake phrase
    #[serde(default)]
    pub device: DeviceFileConfig,

    /// Microphone and utterance capture
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Sensor sampling
    #[serde(default)]
    pub sensors: SensorsFileConfig,

    /// Retry policy for network calls
    #[serde(default)]
    pub retry: RetryFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// LLM configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Status server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Timeout for every network request, in seconds
    pub request_timeout_secs: Option<u64>,

    /// Reply spoken when the generator fails, ending in an emotion tag
    pub fallback_reply: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeviceFileConfig {
    /// Name the device answers to in conversation
    pub name: Option<String>,
    /// Phrases that start a turn
    pub wake_words: Option<Vec<String>>,
    /// Transcription language hint (e.g. "ko")
    pub language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    pub sample_rate: Option<u32>,
    /// Samples per wake detector frame
    pub frame_length: Option<usize>,
    /// Maximum utterance length
    pub capture_secs: Option<f64>,
    /// Peak i16 amplitude below which audio counts as silence
    pub silence_threshold: Option<u16>,
    /// Trailing silence that ends an utterance
    pub silence_secs: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SensorsFileConfig {
    pub interval_ms: Option<u64>,
    /// JSON file with live readings; static readings when absent
    pub file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryFileConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable the voice loop
    pub enabled: Option<bool>,

    /// STT provider ("whisper" or "deepgram")
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS provider ("openai" or "elevenlabs")
    pub tts_provider: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "nova")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "gpt-4o-mini")
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// OpenAI-compatible API base URL
    pub base_url: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Status server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Status server port
    pub port: Option<u16>,
    /// Dashboard directory to serve
    pub static_dir: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `PlantyConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> PlantyConfigFile {
    config_file_path().map_or_else(PlantyConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path
pub fn load_from(path: &Path) -> PlantyConfigFile {
    if !path.exists() {
        return PlantyConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                PlantyConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            PlantyConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/planty/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("planty").join("config.toml"))
}
