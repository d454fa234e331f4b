//! Error types for Planty

use thiserror::Error;

use crate::audio::Session;

/// Result type alias for Planty operations
pub type Result<T> = std::result::Result<T, Error>;

/// Network-bound collaborator a turn depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Speech-to-text
    Transcriber,
    /// Reply generation (LLM)
    Generator,
    /// Text-to-speech
    Synthesizer,
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Transcriber => "transcriber",
            Self::Generator => "generator",
            Self::Synthesizer => "synthesizer",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in Planty
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Audio device already claimed by another session
    #[error("audio device busy ({0} session active)")]
    DeviceBusy(Session),

    /// Transcriber produced no text for the captured utterance
    #[error("no speech detected")]
    NoSpeechDetected,

    /// Upstream service returned an error
    #[error("{service} error{}: {message}", .status.map(|s| format!(" {s}")).unwrap_or_default())]
    Upstream {
        service: Service,
        status: Option<u16>,
        message: String,
    },

    /// Bounded retry gave up
    #[error("{service} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        service: Service,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// Sensor source could not be read
    #[error("sensor read error: {0}")]
    SensorRead(String),

    /// Wake word detection error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// Shutdown was requested while the operation was in progress
    #[error("shutting down")]
    ShuttingDown,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether another attempt at the same request could succeed
    ///
    /// Network failures, rate limits (429) and server errors (5xx) are
    /// transient. Other client errors, and bodies that could not be decoded,
    /// are not worth repeating.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) if e.is_decode() || e.is_builder() => false,
            Self::Http(e) => e
                .status()
                .is_none_or(|s| is_recoverable_status(s.as_u16())),
            Self::Upstream { status, .. } => status.is_none_or(is_recoverable_status),
            Self::Io(_) => true,
            _ => false,
        }
    }

    /// The service an upstream failure came from, if any
    #[must_use]
    pub const fn service(&self) -> Option<Service> {
        match self {
            Self::Upstream { service, .. } | Self::RetriesExhausted { service, .. } => {
                Some(*service)
            }
            _ => None,
        }
    }
}

/// Status codes worth retrying
#[must_use]
pub const fn is_recoverable_status(status: u16) -> bool {
    status == 429 || (status >= 500 && status < 600)
}
