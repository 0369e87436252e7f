// Stateless chat adapter
//
// Every call resends the whole prior history. Within a turn, tool round-trips
// append the assistant tool-call message and one tool message per output to
// the request before resubmitting.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    assemble_turn, BackendAdapter, BackendKind, ChatCompletionsApi, TurnOutcome, TurnRequest,
};
use crate::config::BackendConfig;
use crate::error::Result;
use crate::function_calls::{FunctionCallHandler, ToolCallBackend, ToolExecutor};
use crate::normalized::MessageRole;
use crate::normalizer::{normalizer_for, NormalizerKind, ResponseNormalizer};
use crate::state::{ContinuationToken, ConversationState};
use crate::tool_types::ToolExchange;
use crate::wire::chat::{ChatCompletion, ChatCompletionRequest, ChatRequestMessage, ChatTool};
use crate::wire::parse_lenient;

/// Adapter for the stateless chat completions protocol
pub struct ChatCompletionsAdapter {
    api: Arc<dyn ChatCompletionsApi>,
    config: BackendConfig,
    tool_handler: FunctionCallHandler,
}

impl std::fmt::Debug for ChatCompletionsAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsAdapter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionsAdapter {
    pub fn new(
        api: Arc<dyn ChatCompletionsApi>,
        executor: Arc<dyn ToolExecutor>,
        config: BackendConfig,
    ) -> Self {
        let tool_handler = FunctionCallHandler::new(executor, config.max_tool_iterations);
        Self {
            api,
            config,
            tool_handler,
        }
    }

    /// System directive, prior turns, then the new user message
    fn build_messages(
        state: &ConversationState,
        turn: u32,
        system_directive: Option<&str>,
        user_message: &str,
    ) -> Vec<ChatRequestMessage> {
        let mut messages = Vec::new();
        if let Some(system) = system_directive.filter(|s| !s.is_empty()) {
            messages.push(ChatRequestMessage::new("system", system));
        }
        messages.extend(state.history_before(turn).map(|m| {
            let role = match m.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
            };
            ChatRequestMessage::new(role, m.content.clone())
        }));
        messages.push(ChatRequestMessage::new("user", user_message));
        messages
    }
}

/// Tool round-trip state for one chat turn
struct ChatToolRound<'a> {
    api: &'a dyn ChatCompletionsApi,
    request: ChatCompletionRequest,
}

#[async_trait]
impl ToolCallBackend for ChatToolRound<'_> {
    fn normalizer(&self) -> &dyn ResponseNormalizer {
        normalizer_for(NormalizerKind::Chat)
    }

    async fn submit_tool_outputs(
        &mut self,
        previous: &Value,
        exchanges: &[ToolExchange],
    ) -> Result<Value> {
        let completion: ChatCompletion = parse_lenient(previous);
        let content = completion
            .first_message()
            .map(|m| m.text())
            .filter(|text| !text.is_empty());
        let calls: Vec<_> = exchanges.iter().map(|e| e.call.clone()).collect();

        self.request
            .messages
            .push(ChatRequestMessage::assistant_tool_calls(content, &calls));
        for exchange in exchanges {
            self.request.messages.push(ChatRequestMessage::tool_output(
                exchange.call.id.clone(),
                exchange.output_string(),
            ));
        }

        debug!(
            messages = self.request.messages.len(),
            "Resubmitting chat completion with tool outputs"
        );
        self.api.create_chat_completion(&self.request).await
    }
}

#[async_trait]
impl BackendAdapter for ChatCompletionsAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::ChatCompletions
    }

    async fn send_turn(&self, request: TurnRequest<'_>) -> Result<TurnOutcome> {
        let messages = Self::build_messages(
            request.state,
            request.turn,
            request.system_directive,
            request.user_message,
        );
        let chat_request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            tools: self.config.tools.iter().map(ChatTool::from).collect(),
            temperature: self.config.temperature,
            max_tokens: None,
        };

        info!(
            backend = %self.kind(),
            turn = request.turn,
            history = chat_request.messages.len(),
            "Sending chat completion"
        );
        let initial = self.api.create_chat_completion(&chat_request).await?;

        let mut round = ChatToolRound {
            api: self.api.as_ref(),
            request: chat_request,
        };
        let outcome = self.tool_handler.resolve(&mut round, initial).await?;

        Ok(TurnOutcome {
            response: assemble_turn(self.normalizer(), &outcome),
            usage: outcome.usage,
            degraded: outcome.exhausted,
            raw_responses: outcome.all_responses,
            continuation: ContinuationToken::None,
        })
    }
}
