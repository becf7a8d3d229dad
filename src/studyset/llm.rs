//! Thin OpenAI-compatible chat-completions client used for line tagging and
//! MCQ generation. Unlike the general agent provider this crate doesn't need
//! tool-calling, but it does need `response_format: json_schema` support so
//! the model is constrained to the shapes the pipeline then re-validates.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LlmSettings;
use crate::retry::{with_retries, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("language model connection error: {0}")]
    Connection(String),
    #[error("language model request timed out")]
    Timeout,
    #[error("language model rate limited")]
    RateLimited,
    #[error("language model returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("language model returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends a single-turn chat completion constrained to `schema`, returning
    /// the parsed JSON content. Callers still re-validate the result — a
    /// schema-constrained response is a strong hint, never a guarantee.
    async fn complete_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema_name: &str,
        schema: Value,
    ) -> Result<Value, LlmError>;
}

pub struct OpenAiLikeLlmClient {
    client: Client,
    settings: LlmSettings,
    retry_policy: RetryPolicy,
}

impl OpenAiLikeLlmClient {
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
            retry_policy: RetryPolicy::default(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: String,
    strict: bool,
    schema: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait::async_trait]
impl LlmClient for OpenAiLikeLlmClient {
    async fn complete_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema_name: &str,
        schema: Value,
    ) -> Result<Value, LlmError> {
        let url = format!("{}/chat/completions", self.settings.base_url);
        let body = with_retries(&self.retry_policy, || {
            let url = url.clone();
            let schema = schema.clone();
            async move {
                let request = ChatRequest {
                    model: &self.settings.model,
                    temperature: 0.2,
                    max_tokens: 4096,
                    messages: vec![
                        ChatMessage {
                            role: "system",
                            content: system_prompt,
                        },
                        ChatMessage {
                            role: "user",
                            content: user_prompt,
                        },
                    ],
                    response_format: ResponseFormat {
                        kind: "json_schema",
                        json_schema: JsonSchemaFormat {
                            name: schema_name.to_string(),
                            strict: true,
                            schema: schema.clone(),
                        },
                    },
                };

                let mut builder = self
                    .client
                    .post(&url)
                    .timeout(self.settings.request_timeout)
                    .json(&request);
                if let Some(key) = &self.settings.api_key {
                    builder = builder.bearer_auth(key);
                }

                let response = builder.send().await.map_err(|e| {
                    if e.is_timeout() {
                        (true, LlmError::Timeout)
                    } else {
                        (true, LlmError::Connection(e.to_string()))
                    }
                })?;

                let status = response.status();
                if status.as_u16() == 429 {
                    return Err((true, LlmError::RateLimited));
                }
                if !status.is_success() {
                    let retryable = matches!(status.as_u16(), 500 | 502 | 503 | 504);
                    let text = response.text().await.unwrap_or_default();
                    return Err((
                        retryable,
                        LlmError::Api {
                            status: status.as_u16(),
                            message: text,
                        },
                    ));
                }

                response
                    .json::<ChatResponse>()
                    .await
                    .map_err(|e| (false, LlmError::InvalidResponse(e.to_string())))
            }
        })
        .await?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("no message content in response".into()))?;

        parse_json_lenient(&content)
    }
}

/// Strips Markdown code fences before parsing, since some models wrap JSON
/// responses in ```json blocks even when asked not to.
pub fn parse_json_lenient(content: &str) -> Result<Value, LlmError> {
    let trimmed = content.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let stripped = stripped.strip_suffix("```").unwrap_or(stripped).trim();
    serde_json::from_str(stripped)
        .map_err(|e| LlmError::InvalidResponse(format!("invalid JSON from language model: {e}")))
}

#[allow(dead_code)]
fn default_timeout() -> Duration {
    Duration::from_secs(30)
}
