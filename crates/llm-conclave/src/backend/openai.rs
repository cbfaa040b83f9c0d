//! Backend for OpenAI-compatible Chat Completions endpoints.
//!
//! Works against api.openai.com as well as local servers exposing the same
//! `/chat/completions` route. The responding agent's instruction becomes the
//! system message; its own earlier messages are sent as `assistant`, every
//! other message as `user` tagged with the sender's name.
//!
//! # Example
//!
//! ```rust,no_run
//! use llm_conclave::backend::OpenAiCompatibleBackend;
//!
//! let backend = OpenAiCompatibleBackend::new("http://127.0.0.1:5000/v1", "gpt-4o-mini")
//!     .with_api_key("sk-local")
//!     .with_max_tokens(1024);
//! ```

use super::{BackendError, CompletionBackend};
use crate::agent::Agent;
use crate::config::BackendConfig;
use crate::error::ConfigurationError;
use crate::transcript::Message;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Completion backend speaking the OpenAI Chat Completions protocol.
#[derive(Clone)]
pub struct OpenAiCompatibleBackend {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAiCompatibleBackend {
    /// Creates a backend for `base_url` without a credential or timeout.
    pub fn new(base_url: impl AsRef<str>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: chat_endpoint(base_url.as_ref()),
            api_key: None,
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Builds a backend from [`BackendConfig`], applying its request timeout.
    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigurationError> {
        url::Url::parse(&config.base_url).map_err(|e| ConfigurationError::InvalidValue {
            key: "base_url".to_string(),
            message: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigurationError::InvalidValue {
                key: "timeout_secs".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: chat_endpoint(&config.base_url),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(&self, history: &[Message], agent: &Agent) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !agent.instruction().is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: agent.instruction().to_string(),
                name: None,
            });
        }

        for message in history {
            let role = if message.sender == agent.name() {
                "assistant"
            } else {
                "user"
            };
            messages.push(ChatMessage {
                role,
                content: message.content.clone(),
                name: Some(sanitize_name(&message.sender)),
            });
        }

        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    async fn send_request(&self, body: &ChatCompletionRequest) -> Result<String, BackendError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = parse_retry_after(response.headers().get("retry-after"));
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(map_http_error(status, body_text, retry_after));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| BackendError::malformed(format!("Failed to parse response: {err}")))?;

        extract_text_response(parsed)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatibleBackend {
    async fn complete(&self, history: &[Message], agent: &Agent) -> Result<String, BackendError> {
        let request = self.build_request(history, agent);
        self.send_request(&request).await
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
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

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn chat_endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// The `name` field only accepts `[A-Za-z0-9_-]`.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn extract_text_response(response: ChatCompletionResponse) -> Result<String, BackendError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| BackendError::malformed("Response contained no message content"))
}

fn map_transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::timeout(format!("Request timed out: {err}"))
    } else {
        BackendError::network(format!("Request failed: {err}"))
    }
}

fn map_http_error(status: StatusCode, body: String, retry_after: Option<Duration>) -> BackendError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);

    let err = BackendError::http(status.as_u16(), message);
    match retry_after {
        Some(delay) => err.with_retry_after(delay),
        None => err,
    }
}

fn parse_retry_after(header: Option<&HeaderValue>) -> Option<Duration> {
    let value = header?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
