//! Answer generation through an OpenAI-compatible chat completions API.
//!
//! The rest of the crate only depends on [`GenerationService`]: send
//! messages, get text back. [`OpenAiCompatClient`] implements it against
//! `POST {base_url}/chat/completions` (Groq by default).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::GenerationConfig;
use crate::prompt::ChatMessage;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&GenerationConfig> for GenerationParams {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Not every provider reports token usage.
    pub usage: Option<Usage>,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("No {0} found. Create a .env file and set your key.")]
    MissingApiKey(String),

    #[error("generation request timed out after {0}s")]
    Timeout(u64),

    #[error("generation service unavailable: {0}")]
    Unavailable(String),

    #[error("generation API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<Completion, GenerationError>;
}

pub struct OpenAiCompatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout_secs: u64,
}

impl OpenAiCompatClient {
    /// Build a client from config, reading the key from `api_key_env`.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(&config.base_url, api_key, config.timeout_secs)
    }

    pub fn new(base_url: &str, api_key: String, timeout_secs: u64) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            timeout_secs,
        })
    }
}

#[async_trait]
impl GenerationService for OpenAiCompatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<Completion, GenerationError> {
        let body = serde_json::json!({
            "model": params.model,
            "messages": messages,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        });

        tracing::debug!(model = %params.model, messages = messages.len(), "requesting completion");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.timeout_secs)
                } else {
                    GenerationError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        parse_completion(&json)
    }
}

fn parse_completion(json: &serde_json::Value) -> Result<Completion, GenerationError> {
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            GenerationError::InvalidResponse("missing choices[0].message.content".to_string())
        })?
        .to_string();

    let usage = json
        .get("usage")
        .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok());

    Ok(Completion { text, usage })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion_with_usage() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Blue." } }],
            "usage": { "prompt_tokens": 40, "completion_tokens": 2, "total_tokens": 42 }
        });
        let completion = parse_completion(&json).unwrap();
        assert_eq!(completion.text, "Blue.");
        assert_eq!(
            completion.usage,
            Some(Usage {
                prompt_tokens: 40,
                completion_tokens: 2,
                total_tokens: 42
            })
        );
    }

    #[test]
    fn test_parse_completion_without_usage() {
        let json = serde_json::json!({
            "choices": [{ "message": { "content": "ok" } }]
        });
        assert_eq!(parse_completion(&json).unwrap().usage, None);
    }

    #[test]
    fn test_parse_completion_missing_choices() {
        let err = parse_completion(&serde_json::json!({ "choices": [] })).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse(_)));
    }

    #[test]
    fn test_missing_api_key() {
        let config = GenerationConfig {
            api_key_env: "GW_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };
        let err = OpenAiCompatClient::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("GW_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let client =
            OpenAiCompatClient::new("https://api.example.com/v1/", "k".to_string(), 5).unwrap();
        assert_eq!(client.endpoint, "https://api.example.com/v1/chat/completions");
    }
}
