//! HTTP oracle client
//!
//! Model-agnostic chat client supporting both the Anthropic API and
//! OpenAI-compatible APIs. Each call-site is routed to its configured model;
//! the engine never hardcodes one.

use crate::core::config::ModelTable;
use crate::core::error::{GapError, Result};
use crate::oracle::{CallSite, Oracle};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// API wire format
#[derive(Debug, Clone, PartialEq)]
pub enum ApiFormat {
    Anthropic,
    OpenAI,
}

/// Chat-completion oracle over HTTP
pub struct HttpOracle {
    client: Client,
    api_key: String,
    api_url: String,
    api_format: ApiFormat,
    models: ModelTable,
}

impl HttpOracle {
    pub fn new(api_key: String, api_url: String, models: ModelTable) -> Self {
        let api_format = Self::detect_api_format(&api_url);
        Self {
            client: Client::new(),
            api_key,
            api_url,
            api_format,
            models,
        }
    }

    fn detect_api_format(url: &str) -> ApiFormat {
        if url.contains("anthropic.com") {
            ApiFormat::Anthropic
        } else {
            // OpenAI, DeepSeek and other compatible APIs share one format
            ApiFormat::OpenAI
        }
    }

    /// Create a client from environment variables.
    ///
    /// Required: LLM_API_KEY
    /// Optional: LLM_API_URL (defaults to the OpenAI chat endpoint)
    pub fn from_env(models: ModelTable) -> Result<Self> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| GapError::Oracle("LLM_API_KEY not set".into()))?;
        let api_url = std::env::var("LLM_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".into());
        Ok(Self::new(api_key, api_url, models))
    }

    async fn complete_anthropic(&self, model: &str, system: &str, user: &str) -> Result<String> {
        let request = AnthropicRequest {
            model: model.to_string(),
            max_tokens: 4096,
            system: system.into(),
            messages: vec![Message {
                role: "user".into(),
                content: user.into(),
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| GapError::Oracle(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GapError::Oracle(format!("API error: {error_text}")));
        }

        let completion: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| GapError::Oracle(e.to_string()))?;

        completion
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| GapError::Oracle("empty response".into()))
    }

    async fn complete_openai(&self, model: &str, system: &str, user: &str) -> Result<String> {
        let request = OpenAIRequest {
            model: model.to_string(),
            max_tokens: 4096,
            messages: vec![
                Message {
                    role: "system".into(),
                    content: system.into(),
                },
                Message {
                    role: "user".into(),
                    content: user.into(),
                },
            ],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| GapError::Oracle(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GapError::Oracle(format!("API error: {error_text}")));
        }

        let completion: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| GapError::Oracle(e.to_string()))?;

        completion
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| GapError::Oracle("empty response".into()))
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn complete(&self, site: CallSite, system: &str, user: &str) -> Result<String> {
        let model = site.model(&self.models);
        tracing::debug!(?site, model, "oracle request");
        match self.api_format {
            ApiFormat::Anthropic => self.complete_anthropic(model, system, user).await,
            ApiFormat::OpenAI => self.complete_openai(model, system, user).await,
        }
    }
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: String,
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_api_format_from_url() {
        assert_eq!(
            HttpOracle::detect_api_format("https://api.anthropic.com/v1/messages"),
            ApiFormat::Anthropic
        );
        assert_eq!(
            HttpOracle::detect_api_format("https://api.deepseek.com/chat/completions"),
            ApiFormat::OpenAI
        );
    }

    #[test]
    fn sites_route_to_configured_models() {
        let mut models = ModelTable::default();
        models.self_eval = "평가-전용-모델".into();
        assert_eq!(CallSite::SelfEval.model(&models), "평가-전용-모델");
        assert_eq!(CallSite::Command.model(&models), models.command);
    }
}
