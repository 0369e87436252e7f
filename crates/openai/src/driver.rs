// OpenAI interlocutor driver
//
// Plain chat completion for the simulated user. No tools are offered; the
// reply is read through the chat normalizer like any backend payload.

use async_trait::async_trait;
use tracing::debug;

use promptlab_core::backends::ChatCompletionsApi;
use promptlab_core::error::Result;
use promptlab_core::llm_driver::{LlmCallConfig, LlmDriver, LlmMessage, LlmResponse};
use promptlab_core::normalizer::{normalizer_for, NormalizerKind};
use promptlab_core::wire::chat::{ChatCompletionRequest, ChatRequestMessage};

use crate::client::OpenAiClient;

/// LLM driver backed by OpenAI chat completions
#[derive(Debug, Clone)]
pub struct OpenAiChatDriver {
    client: OpenAiClient,
}

impl OpenAiChatDriver {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }

    fn to_request(messages: &[LlmMessage], config: &LlmCallConfig) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: config.model.clone(),
            messages: messages
                .iter()
                .map(|m| ChatRequestMessage::new(m.role.as_str(), m.content.clone()))
                .collect(),
            tools: Vec::new(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl LlmDriver for OpenAiChatDriver {
    async fn chat_completion(
        &self,
        messages: Vec<LlmMessage>,
        config: &LlmCallConfig,
    ) -> Result<LlmResponse> {
        let request = Self::to_request(&messages, config);
        debug!(model = %config.model, messages = messages.len(), "Interlocutor completion");

        let raw = self.client.create_chat_completion(&request).await?;
        let response = normalizer_for(NormalizerKind::Chat).normalize_single_response(&raw);

        Ok(LlmResponse {
            text: response.text,
            usage: response.usage,
            raw,
        })
    }
}
