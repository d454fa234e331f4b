//! Speech-to-text (STT) processing

use std::time::Duration;

use async_trait::async_trait;

use crate::audio::pcm_to_wav;
use crate::error::Service;
use crate::{Error, Result};

/// Turns a captured utterance into text
///
/// An empty string means the service heard nothing it could transcribe.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe 16-bit mono PCM
    ///
    /// # Errors
    ///
    /// Returns error if the service call fails
    async fn transcribe(&self, pcm: &[i16], sample_rate: u32, language: &str) -> Result<String>;
}

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// STT provider backend
#[derive(Clone, Debug)]
enum SttProvider {
    /// OpenAI-compatible `/audio/transcriptions` endpoint
    Whisper { base_url: String },
    Deepgram,
}

/// Transcribes speech over HTTP
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    model: String,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create a new STT instance using an OpenAI-compatible Whisper endpoint
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing or the HTTP client cannot be built
    pub fn new_whisper(
        api_key: String,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key,
            model,
            provider: SttProvider::Whisper {
                base_url: base_url.trim_end_matches('/').to_string(),
            },
        })
    }

    /// Create a new STT instance using Deepgram
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing or the HTTP client cannot be built
    pub fn new_deepgram(api_key: String, model: String, timeout: Duration) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key,
            model,
            provider: SttProvider::Deepgram,
        })
    }

    /// Transcribe using Whisper
    async fn transcribe_whisper(&self, base_url: &str, wav: Vec<u8>, language: &str) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), language, "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")?,
            )
            .text("model", self.model.clone())
            .text("language", language.to_string());

        let response = self
            .client
            .post(format!("{base_url}/audio/transcriptions"))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(upstream_error(status.as_u16(), body));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(&self, wav: Vec<u8>, language: &str) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), language, "starting Deepgram transcription");

        let url = format!(
            "https://api.deepgram.com/v1/listen?model={}&language={language}&punctuate=true",
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(wav)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Deepgram request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(upstream_error(status.as_u16(), body));
        }

        let result: DeepgramResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Deepgram response");
            e
        })?;

        let transcript = result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.clone())
            .unwrap_or_default();

        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, pcm: &[i16], sample_rate: u32, language: &str) -> Result<String> {
        let wav = pcm_to_wav(pcm, sample_rate)?;
        match &self.provider {
            SttProvider::Whisper { base_url } => {
                self.transcribe_whisper(base_url, wav, language).await
            }
            SttProvider::Deepgram => self.transcribe_deepgram(wav, language).await,
        }
    }
}

fn upstream_error(status: u16, body: String) -> Error {
    Error::Upstream {
        service: Service::Transcriber,
        status: Some(status),
        message: body,
    }
}
