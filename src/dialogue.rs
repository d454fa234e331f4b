//! Reply generation
//!
//! The generator turns a transcript plus the current sensor snapshot into a
//! one-sentence reply ending in an emotion tag, e.g. `"물을 줄게요! [happy]"`.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::emotion::Emotion;
use crate::error::Service;
use crate::state::SensorReadings;
use crate::{Error, Result};

/// Reply spoken when the generator cannot be reached
pub const FALLBACK_REPLY: &str = "죄송합니다. 지금은 대화하기 어려운 것 같아요. [neutral]";

/// Produces the raw, tagged reply for one turn
#[async_trait]
pub trait DialogueGenerator: Send + Sync {
    /// Generate a reply to `text` given the latest sensor readings
    ///
    /// # Errors
    ///
    /// Returns error if the service call fails
    async fn generate(&self, text: &str, sensors: &SensorReadings) -> Result<String>;
}

/// Sampling settings for the chat model
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub base_url: String,
    pub timeout: Duration,
}

/// OpenAI-compatible chat completions client
pub struct OpenAiChat {
    client: Client,
    api_key: String,
    name: String,
    settings: ChatSettings,
}

impl OpenAiChat {
    /// Create a chat client speaking as the device called `name`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing or the HTTP client cannot be built
    pub fn new(api_key: String, name: String, settings: ChatSettings) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for dialogue".to_string(),
            ));
        }

        Ok(Self {
            client: Client::builder().timeout(settings.timeout).build()?,
            api_key,
            name,
            settings,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl DialogueGenerator for OpenAiChat {
    async fn generate(&self, text: &str, sensors: &SensorReadings) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.settings.model,
            messages: vec![
                Message {
                    role: "system",
                    content: build_system_prompt(&self.name, sensors),
                },
                Message {
                    role: "user",
                    content: text.to_string(),
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        tracing::debug!(model = %self.settings.model, "requesting reply");

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status, body = %body, "chat completion error");
            return Err(Error::Upstream {
                service: Service::Generator,
                status: Some(status),
                message: body,
            });
        }

        let result: ChatCompletionResponse = response.json().await?;
        let reply = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Upstream {
                service: Service::Generator,
                status: None,
                message: "empty completion".to_string(),
            })?;

        tracing::info!(reply = %reply, "reply generated");
        Ok(reply)
    }
}

/// Persona prompt carrying the sensor snapshot
#[must_use]
pub fn build_system_prompt(name: &str, sensors: &SensorReadings) -> String {
    let tags = Emotion::ALL.map(Emotion::as_str).join(", ");

    let mut prompt = String::new();
    let _ = writeln!(prompt, "당신은 {name}라는 AI 식물 친구입니다.");
    prompt.push_str("친근하고 자연스럽게 대화하세요.\n");
    prompt.push_str("응답은 반드시 한 문장으로 해주세요.\n");
    prompt.push_str("응답의 마지막에는 [표정]을 표시해주세요.\n");
    let _ = writeln!(prompt, "표정은 다음 중 하나여야 합니다: {tags}");
    prompt.push('\n');
    prompt.push_str("현재 센서 데이터:\n");
    let _ = writeln!(prompt, "- 습도: {}%", sensors.humidity);
    let _ = writeln!(prompt, "- 온도: {}°C", sensors.temperature);
    let _ = writeln!(prompt, "- 조도: {} lux", sensors.light);
    let _ = writeln!(prompt, "- 영양분: {}%", sensors.nutrients);
    prompt.push('\n');
    prompt.push_str("센서 데이터는 사용자가 물어볼 때만 언급하세요.\n");
    prompt.push_str("일상적인 대화에서는 센서 데이터를 언급하지 않아도 됩니다.");
    prompt
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
