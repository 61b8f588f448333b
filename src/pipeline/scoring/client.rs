use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{ChatMessage, ChatRequest, ChatResponse};
use crate::config::LlmConfig;
use crate::models::TokenUsage;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limited (status {status}): {body}")]
    RateLimited { status: u16, body: String },

    #[error("Transient server error (status {status}): {body}")]
    Transient { status: u16, body: String },

    #[error("Cannot reach completion endpoint: {0}")]
    Connection(String),

    #[error("Completion endpoint returned error (status {status}): {body}")]
    Request { status: u16, body: String },

    #[error("Malformed completion response: {0}")]
    Decode(String),

    #[error("Completion response has no choices")]
    EmptyChoice,

    #[error("Client configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited { .. } | Self::Transient { .. } | Self::Connection(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "TimeoutError",
            Self::RateLimited { .. } => "RateLimitError",
            Self::Transient { .. } => "APIError",
            Self::Connection(_) => "ConnectionError",
            Self::Request { .. } => "RequestError",
            Self::Decode(_) => "DecodeError",
            Self::EmptyChoice => "EmptyChoiceError",
            Self::Config(_) => "ConfigError",
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            408 => Self::Timeout(body),
            429 => Self::RateLimited { status, body },
            500..=599 => Self::Transient { status, body },
            _ => Self::Request { status, body },
        }
    }
}

/// Chat completion abstraction (allows mocking for tests)
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_secs: config.request_timeout_secs,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(format!("no response within {}s", self.timeout_secs))
        } else if e.is_connect() {
            LlmError::Connection(format!("{}: {e}", self.base_url))
        } else {
            LlmError::Connection(e.to_string())
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), body));
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(e.to_string())
            } else {
                LlmError::Decode(e.to_string())
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyChoice)?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(ChatResponse { content, usage })
    }
}
