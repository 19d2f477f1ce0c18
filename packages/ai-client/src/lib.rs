//! Provider-agnostic chat-completion client.
//!
//! A clean, minimal client for OpenAI-compatible chat APIs (OpenAI,
//! OpenRouter, local inference servers) with no domain-specific logic.
//! Supports plain completions and strict-JSON extraction.
//!
//! # Example
//!
//! ```rust,ignore
//! use ai_client::{AiClient, Message};
//!
//! let client = AiClient::from_env()?;
//! let answer = client
//!     .chat(&[Message::system("You are terse."), Message::user("Say hi")])
//!     .await?;
//! ```

pub mod error;

pub use error::{AiClientError, Result};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default request endpoint path for OpenAI-compatible APIs.
const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Chat-completion client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct AiClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AiClient {
    /// Create a new client with the given API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
        }
    }

    /// Create from environment: `AI_API_KEY`, optional `AI_BASE_URL`
    /// and `AI_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("AI_API_KEY")
            .map_err(|_| AiClientError::Config("AI_API_KEY not set".into()))?;
        let model = std::env::var("AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let mut client = Self::new(api_key, model);
        if let Ok(base_url) = std::env::var("AI_BASE_URL") {
            client.base_url = base_url.trim_end_matches('/').to_string();
        }
        Ok(client)
    }

    /// Set a custom base URL (for OpenRouter, proxies, local servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(&self, messages: &[Message], json_mode: bool) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.0,
            response_format: json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let response = self
            .http_client
            .post(format!("{}{}", self.base_url, CHAT_COMPLETIONS_PATH))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AiClientError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AiClientError::Api {
                status: status.as_u16(),
                message: truncate(&message, 500),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiClientError::Parse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiClientError::Parse("response carried no content".into()))?;

        debug!(model = %self.model, chars = content.len(), "chat completion received");
        Ok(content)
    }

    /// Plain chat completion; returns the assistant text.
    pub async fn chat(&self, messages: &[Message]) -> Result<String> {
        self.request(messages, false).await
    }

    /// JSON-mode completion: the model is constrained to emit a single
    /// JSON object. Returns the raw JSON text for the caller to parse
    /// against its own schema.
    pub async fn chat_json(&self, messages: &[Message]) -> Result<String> {
        self.request(messages, true).await
    }

    /// Typed extraction: JSON-mode completion deserialized into `T`.
    pub async fn extract<T: serde::de::DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
    ) -> Result<T> {
        let raw = self
            .chat_json(&[Message::system(system), Message::user(user)])
            .await?;
        serde_json::from_str(strip_code_fences(&raw))
            .map_err(|e| AiClientError::Parse(format!("{}: {}", e, truncate(&raw, 200))))
    }
}

/// Models sometimes wrap JSON in markdown fences even in JSON mode.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push('…');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fences() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn message_builders_set_roles() {
        assert_eq!(Message::system("x").role, "system");
        assert_eq!(Message::user("x").role, "user");
    }

    #[test]
    fn from_env_requires_the_key() {
        std::env::remove_var("AI_API_KEY");
        assert!(AiClient::from_env().is_err());
    }
}
