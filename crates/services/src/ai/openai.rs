use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::backend::{GenerationRequest, TextGenerator};
use crate::error::BackendError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatCompletionsConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl ChatCompletionsConfig {
    /// Read `COACH_AI_*` settings; `None` without an API key.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let api_key = lookup("COACH_AI_API_KEY")?;
        if api_key.trim().is_empty() {
            return None;
        }
        let base_url = lookup("COACH_AI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let model = lookup("COACH_AI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into());
        Some(Self {
            base_url,
            api_key,
            model,
        })
    }
}

/// Text generation over an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct ChatCompletionsGenerator {
    client: Client,
    config: Option<ChatCompletionsConfig>,
}

impl ChatCompletionsGenerator {
    #[must_use]
    pub fn new(config: Option<ChatCompletionsConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.config.as_ref().map(|c| c.model.as_str())
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        let config = self.config.as_ref().ok_or(BackendError::Disabled)?;

        let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: &request.system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        let payload = ChatRequest {
            model: &config.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&config.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::HttpStatus(response.status().as_u16()));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(BackendError::EmptyResponse)?;

        Ok(content.trim().to_string())
    }

    fn enabled(&self) -> bool {
        self.config.is_some()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use coach_core::model::Language;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn config_requires_a_key() {
        assert!(ChatCompletionsConfig::from_lookup(lookup(&[])).is_none());
        assert!(ChatCompletionsConfig::from_lookup(lookup(&[("COACH_AI_API_KEY", " ")])).is_none());

        let config =
            ChatCompletionsConfig::from_lookup(lookup(&[("COACH_AI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn payload_carries_system_prompt_and_token_limit() {
        let request = GenerationRequest {
            system: "You are Yuri.".into(),
            prompt: "Explain S3.".into(),
            language: Language::En,
            max_tokens: 300,
            temperature: 0.7,
        };
        let payload = ChatRequest {
            model: "m",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["max_tokens"], 300);
    }

    #[tokio::test]
    async fn unconfigured_generator_is_disabled() {
        let generator = ChatCompletionsGenerator::new(None);
        assert!(!generator.enabled());
        let request = GenerationRequest {
            system: String::new(),
            prompt: "hi".into(),
            language: Language::Ja,
            max_tokens: 10,
            temperature: 0.0,
        };
        assert_eq!(
            generator.generate(&request).await,
            Err(BackendError::Disabled)
        );
    }
}
