// Response-chaining adapter
//
// The first call of a run carries the system directive, temperature, tools and
// the first user message. Later calls carry only the new input and the
// previous response id; the backend recalls history. Chained requests never
// carry instructions or temperature.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::{assemble_turn, BackendAdapter, BackendKind, ResponsesApi, TurnOutcome, TurnRequest};
use crate::config::BackendConfig;
use crate::error::{EngineError, Result};
use crate::function_calls::{
    interleave_call_outputs, FunctionCallHandler, ToolCallBackend, ToolExecutor,
};
use crate::normalizer::{normalizer_for, NormalizerKind, ResponseNormalizer};
use crate::state::ContinuationToken;
use crate::tool_types::ToolExchange;
use crate::wire::parse_lenient;
use crate::wire::responses::{ResponseObject, ResponsesInput, ResponsesRequest};

/// Adapter for the chained responses protocol
pub struct ResponsesAdapter {
    api: Arc<dyn ResponsesApi>,
    config: BackendConfig,
    tool_handler: FunctionCallHandler,
}

impl std::fmt::Debug for ResponsesAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponsesAdapter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ResponsesAdapter {
    pub fn new(
        api: Arc<dyn ResponsesApi>,
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

    fn build_request(
        &self,
        previous_response_id: Option<&str>,
        system_directive: Option<&str>,
        user_message: &str,
    ) -> ResponsesRequest {
        let first_call = previous_response_id.is_none();
        ResponsesRequest {
            model: self.config.model.clone(),
            input: ResponsesInput::Text(user_message.to_string()),
            instructions: system_directive
                .filter(|s| first_call && !s.is_empty())
                .map(str::to_string),
            previous_response_id: previous_response_id.map(str::to_string),
            tools: self.config.tool_payloads(),
            temperature: self.config.temperature.filter(|_| first_call),
        }
    }
}

fn response_id(raw: &Value) -> Result<String> {
    let response: ResponseObject = parse_lenient(raw);
    response
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| EngineError::protocol("response payload has no id to chain from"))
}

/// Tool round-trip state for one chained turn
struct ResponsesToolRound<'a> {
    api: &'a dyn ResponsesApi,
    model: String,
    tools: Vec<Value>,
}

#[async_trait]
impl ToolCallBackend for ResponsesToolRound<'_> {
    fn normalizer(&self) -> &dyn ResponseNormalizer {
        normalizer_for(NormalizerKind::Responses)
    }

    async fn submit_tool_outputs(
        &mut self,
        previous: &Value,
        exchanges: &[ToolExchange],
    ) -> Result<Value> {
        let previous_id = response_id(previous)?;
        let request = ResponsesRequest {
            model: self.model.clone(),
            input: ResponsesInput::Items(interleave_call_outputs(exchanges)),
            instructions: None,
            previous_response_id: Some(previous_id),
            tools: self.tools.clone(),
            temperature: None,
        };
        debug!(
            outputs = exchanges.len(),
            previous_response_id = ?request.previous_response_id,
            "Submitting function call outputs"
        );
        self.api.create_response(&request).await
    }
}

#[async_trait]
impl BackendAdapter for ResponsesAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Responses
    }

    async fn send_turn(&self, request: TurnRequest<'_>) -> Result<TurnOutcome> {
        let previous = request.state.continuation.response_id();
        let responses_request =
            self.build_request(previous, request.system_directive, request.user_message);

        info!(
            backend = %self.kind(),
            turn = request.turn,
            previous_response_id = ?previous,
            "Sending chained response request"
        );
        let initial = self.api.create_response(&responses_request).await?;

        let mut round = ResponsesToolRound {
            api: self.api.as_ref(),
            model: self.config.model.clone(),
            tools: responses_request.tools,
        };
        let outcome = self.tool_handler.resolve(&mut round, initial).await?;
        let continuation = ContinuationToken::Response {
            response_id: response_id(&outcome.final_response)?,
        };

        Ok(TurnOutcome {
            response: assemble_turn(self.normalizer(), &outcome),
            usage: outcome.usage,
            degraded: outcome.exhausted,
            raw_responses: outcome.all_responses,
            continuation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MockResponsesApi, MockToolExecutor};
    use crate::state::ConversationState;
    use crate::tool_types::ToolDefinition;
    use serde_json::json;

    fn config() -> BackendConfig {
        BackendConfig::mock(BackendKind::Responses)
            .with_temperature(0.2)
            .with_tools(vec![ToolDefinition::function(
                "lookup_order",
                "Look up an order",
                json!({"type": "object"}),
            )])
    }

    #[tokio::test]
    async fn test_first_call_only_carries_instructions_and_temperature() {
        let api = Arc::new(MockResponsesApi::new());
        let adapter = ResponsesAdapter::new(api.clone(), Arc::new(MockToolExecutor::new()), config());

        let mut state = ConversationState::new();
        let first = adapter
            .send_turn(TurnRequest {
                turn: 1,
                user_message: "Hi",
                system_directive: Some("Be brief"),
                state: &state,
            })
            .await
            .unwrap();
        state.continuation = first.continuation.clone();

        adapter
            .send_turn(TurnRequest {
                turn: 2,
                user_message: "Anything else?",
                system_directive: Some("Be brief"),
                state: &state,
            })
            .await
            .unwrap();

        let requests = api.requests().await;
        assert_eq!(requests[0]["instructions"], "Be brief");
        assert!((requests[0]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert!(requests[0].get("previous_response_id").is_none());

        assert!(requests[1].get("instructions").is_none());
        assert!(requests[1].get("temperature").is_none());
        assert_eq!(requests[1]["previous_response_id"], "resp_mock_1");
        assert_eq!(requests[1]["input"], "Anything else?");
        assert_eq!(requests[1]["tools"][0]["name"], "lookup_order");
    }

    #[tokio::test]
    async fn test_tool_outputs_are_paired_with_calls() {
        let api = Arc::new(MockResponsesApi::new());
        api.push_response(json!({
            "id": "resp_tool",
            "output": [{"type": "function_call", "call_id": "call_9", "name": "lookup_order", "arguments": "{}"}],
            "usage": {"input_tokens": 10, "output_tokens": 20, "total_tokens": 30}
        }))
        .await;
        let adapter = ResponsesAdapter::new(api.clone(), Arc::new(MockToolExecutor::new()), config());

        let state = ConversationState::new();
        let outcome = adapter
            .send_turn(TurnRequest {
                turn: 1,
                user_message: "Where is my order?",
                system_directive: None,
                state: &state,
            })
            .await
            .unwrap();

        let requests = api.requests().await;
        assert_eq!(requests[1]["previous_response_id"], "resp_tool");
        let input = requests[1]["input"].as_array().unwrap();
        assert_eq!(input[0]["type"], "function_call");
        assert_eq!(input[0]["call_id"], "call_9");
        assert_eq!(input[1]["type"], "function_call_output");
        assert_eq!(input[1]["call_id"], "call_9");

        assert_eq!(outcome.continuation.response_id(), Some("resp_mock_1"));
        assert_eq!(outcome.response.tool_calls[0].id, "call_9");
    }
}
