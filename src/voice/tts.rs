//! Text-to-speech (TTS) processing

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Service;
use crate::{Error, Result};

/// Turns reply text into encoded (MP3) audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text`
    ///
    /// # Errors
    ///
    /// Returns error if the service call fails
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// TTS provider backend
#[derive(Clone, Debug)]
enum TtsProvider {
    /// OpenAI-compatible `/audio/speech` endpoint
    OpenAI { base_url: String },
    ElevenLabs,
}

/// Synthesizes speech over HTTP
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    speed: f32,
    model: String,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a new TTS instance using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing or the HTTP client cannot be built
    pub fn new_openai(
        api_key: String,
        voice: String,
        speed: f32,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key,
            voice,
            speed,
            model,
            provider: TtsProvider::OpenAI {
                base_url: base_url.trim_end_matches('/').to_string(),
            },
        })
    }

    /// Create a new TTS instance using ElevenLabs
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing or the HTTP client cannot be built
    pub fn new_elevenlabs(
        api_key: String,
        voice_id: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key,
            voice: voice_id,
            speed: 1.0, // ElevenLabs doesn't use speed in the same way
            model,
            provider: TtsProvider::ElevenLabs,
        })
    }

    /// Synthesize using OpenAI TTS
    async fn synthesize_openai(&self, base_url: &str, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post(format!("{base_url}/audio/speech"))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status, body = %body, "OpenAI TTS error");
            return Err(upstream_error(status, body));
        }

        let audio = response.bytes().await?;
        tracing::debug!(bytes = audio.len(), "speech synthesized");
        Ok(audio.to_vec())
    }

    /// Synthesize using ElevenLabs TTS
    async fn synthesize_elevenlabs(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}",
            self.voice
        );

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status, body = %body, "ElevenLabs TTS error");
            return Err(upstream_error(status, body));
        }

        let audio = response.bytes().await?;
        tracing::debug!(bytes = audio.len(), "speech synthesized");
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        match &self.provider {
            TtsProvider::OpenAI { base_url } => self.synthesize_openai(base_url, text).await,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text).await,
        }
    }
}

fn upstream_error(status: u16, body: String) -> Error {
    Error::Upstream {
        service: Service::Synthesizer,
        status: Some(status),
        message: body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_requires_api_key() {
        let result = TextToSpeech::new_openai(
            String::new(),
            "nova".to_string(),
            1.0,
            "tts-1".to_string(),
            "https://api.openai.com/v1".to_string(),
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn elevenlabs_requires_api_key() {
        let result = TextToSpeech::new_elevenlabs(
            String::new(),
            "voice".to_string(),
            "eleven_multilingual_v2".to_string(),
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn auth_failure_is_not_transient() {
        let err = upstream_error(401, "invalid key".to_string());
        assert!(!err.is_transient());
        assert_eq!(err.service(), Some(Service::Synthesizer));
    }
}
