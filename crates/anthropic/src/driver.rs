// Anthropic Claude LLM Driver
//
// Implementation of LlmDriver for Anthropic's Messages API. Used as the
// interlocutor's model when the run selects the anthropic provider; the
// system prompt travels in the top-level `system` field.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use promptlab_core::error::{EngineError, Result};
use promptlab_core::llm_driver::{
    LlmCallConfig, LlmDriver, LlmMessage, LlmMessageRole, LlmResponse,
};
use promptlab_core::normalizer::{normalizer_for, NormalizerKind};
use promptlab_core::wire::messages::{MessagesRequest, MessagesRequestMessage};

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The Messages API requires `max_tokens`
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

fn status_error_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "BadRequestError",
        401 => "AuthenticationError",
        403 => "PermissionDeniedError",
        404 => "NotFoundError",
        429 => "RateLimitError",
        529 => "OverloadedError",
        s if s >= 500 => "InternalServerError",
        _ => "APIStatusError",
    }
}

/// Anthropic Claude LLM Driver
///
/// # Example
///
/// ```ignore
/// use promptlab_anthropic::AnthropicLlmDriver;
///
/// let driver = AnthropicLlmDriver::new("your-api-key");
/// // or with custom endpoint
/// let driver = AnthropicLlmDriver::with_base_url("your-api-key", "https://api.example.com/v1/messages");
/// ```
#[derive(Clone)]
pub struct AnthropicLlmDriver {
    client: Client,
    api_key: String,
    api_url: String,
}

impl AnthropicLlmDriver {
    /// Create a new driver with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_API_URL)
    }

    /// Create a new driver with a custom messages endpoint URL
    pub fn with_base_url(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: api_url.into(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Split out the system prompt; remaining messages keep their order
    fn convert_messages(messages: &[LlmMessage]) -> (Option<String>, Vec<MessagesRequestMessage>) {
        let mut system_parts = Vec::new();
        let mut converted = Vec::new();

        for msg in messages {
            match msg.role {
                LlmMessageRole::System => system_parts.push(msg.content.as_str()),
                LlmMessageRole::User | LlmMessageRole::Assistant => {
                    converted.push(MessagesRequestMessage {
                        role: msg.role.as_str().to_string(),
                        content: msg.content.clone(),
                    })
                }
            }
        }

        let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
        (system, converted)
    }

    fn to_request(messages: &[LlmMessage], config: &LlmCallConfig) -> MessagesRequest {
        let (system, messages) = Self::convert_messages(messages);
        MessagesRequest {
            model: config.model.clone(),
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            system,
            temperature: config.temperature,
        }
    }
}

impl std::fmt::Debug for AnthropicLlmDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicLlmDriver")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl LlmDriver for AnthropicLlmDriver {
    async fn chat_completion(
        &self,
        messages: Vec<LlmMessage>,
        config: &LlmCallConfig,
    ) -> Result<LlmResponse> {
        let request = Self::to_request(&messages, config);
        debug!(model = %request.model, messages = request.messages.len(), "POST messages");

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let class = if e.is_timeout() {
                    "APITimeoutError"
                } else {
                    "APIConnectionError"
                };
                EngineError::backend(class, format!("Failed to send request to Anthropic: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::backend(
                status_error_class(status),
                format!("Anthropic API error ({status}): {body}"),
            ));
        }

        let raw: Value = response.json().await.map_err(|e| {
            EngineError::protocol(format!("Anthropic returned a non-JSON body: {e}"))
        })?;
        let normalized = normalizer_for(NormalizerKind::Messages).normalize_single_response(&raw);

        Ok(LlmResponse {
            text: normalized.text,
            usage: normalized.usage,
            raw,
        })
    }
}
