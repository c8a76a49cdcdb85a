//! OpenAI-compatible chat-completion client (Groq by default).

use crate::config::PromptTemplate;
use crate::error::{Error, Result};
use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Anything that can answer a chat-completion request.
///
/// Returns `Ok(None)` when the provider answered without usable content.
#[async_trait::async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<Option<String>>;
}

/// HTTP client for the chat-completions endpoint.
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl ChatClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build().context("Failed to build HTTP client")?,
            api_url: api_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait::async_trait]
impl ChatCompletion for ChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<Option<String>> {
        debug!("Sending chat completion: model={}", request.model);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to LLM API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let details = serde_json::from_str(&error_text)
                .unwrap_or(serde_json::Value::String(error_text));
            return Err(Error::Upstream {
                status: status.as_u16(),
                details,
            });
        }

        let response: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse LLM API response")?;

        if let Some(usage) = &response.usage {
            info!(
                "LLM response ({}): {} tokens (prompt: {}, completion: {})",
                request.model, usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|content| !content.is_empty()))
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// System style guide plus one rendered user message.
    pub fn from_template(template: &PromptTemplate, user_prompt: String) -> Self {
        Self {
            model: template.model.clone(),
            messages: vec![
                Message::system(template.system.clone()),
                Message::user(user_prompt),
            ],
            temperature: template.temperature,
            max_tokens: template.max_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// ============================================================================
// Message types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}
