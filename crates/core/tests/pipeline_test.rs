// End-to-end conversation runs in mock mode
//
// Run with: cargo test -p promptlab-core --test pipeline_test

use async_trait::async_trait;
use promptlab_core::memory::{MockChatCompletionsApi, MockToolExecutor, ScriptedDriver};
use promptlab_core::{
    run, ApiTypeTag, BackendAdapter, BackendConfig, BackendKind, BackendRegistry,
    ChatCompletionsAdapter, ContinuationToken, ConversationOrchestrator, ConversationStatus,
    EngineError, EvaluatorRegistry, InterlocutorConfig, InterlocutorSimulator, LlmCallConfig,
    MessageRole, NormalizedResponse, Result, RunConfig, ScorerDescriptor, ToolDefinition,
    ToolResultKind, TurnOutcome, TurnRequest, UsageTotals,
};
use serde_json::json;
use std::sync::Arc;

fn run_config(kind: BackendKind, max_turns: u32) -> RunConfig {
    RunConfig::builder(
        "You are a customer whose order is late",
        BackendConfig::mock(kind),
    )
    .system_directive("You are a support agent")
    .first_message("Hello")
    .max_turns(max_turns)
    .build()
}

#[tokio::test]
async fn test_chat_three_turns_alternate_with_paired_turn_numbers() {
    let outcome = run(&run_config(BackendKind::ChatCompletions, 3), &BackendRegistry::with_mocks())
        .await
        .unwrap();

    assert_eq!(outcome.status, ConversationStatus::Completed);
    assert_eq!(outcome.messages.len(), 6);

    let turns: Vec<u32> = outcome.messages.iter().map(|m| m.turn).collect();
    assert_eq!(turns, vec![1, 1, 2, 2, 3, 3]);
    for (i, message) in outcome.messages.iter().enumerate() {
        let expected = if i % 2 == 0 {
            MessageRole::User
        } else {
            MessageRole::Assistant
        };
        assert_eq!(message.role, expected);
    }

    assert_eq!(outcome.messages[0].content, "Hello");
    assert_eq!(outcome.messages[1].content, "Mock response to: Hello");
    assert_eq!(outcome.continuation_token, ContinuationToken::None);
    assert_eq!(outcome.usage, Some(UsageTotals::new(30, 60, 90)));
    assert_eq!(outcome.raw_responses.len(), 3);
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn test_responses_run_chains_response_ids() {
    let outcome = run(&run_config(BackendKind::Responses, 2), &BackendRegistry::with_mocks())
        .await
        .unwrap();

    assert_eq!(outcome.messages.len(), 4);
    assert_eq!(outcome.continuation_token.response_id(), Some("resp_mock_2"));

    let first_reply = outcome.messages[1].metadata.as_ref().unwrap();
    assert_eq!(first_reply.continuation.response_id(), Some("resp_mock_1"));
    assert_eq!(first_reply.response_id.as_deref(), Some("resp_mock_1"));
}

#[tokio::test(start_paused = true)]
async fn test_assistants_run_keeps_thread_and_collects_file_search() {
    let outcome = run(&run_config(BackendKind::Assistants, 2), &BackendRegistry::with_mocks())
        .await
        .unwrap();

    assert_eq!(outcome.status, ConversationStatus::Completed);
    assert_eq!(outcome.messages.len(), 4);
    assert_eq!(outcome.continuation_token.thread_id(), Some("thread_mock"));
    match &outcome.continuation_token {
        ContinuationToken::Thread { run_id, .. } => {
            assert_eq!(run_id.as_deref(), Some("run_mock_2"))
        }
        other => panic!("expected thread continuation, got {other:?}"),
    }

    assert_eq!(outcome.tool_results.file_search.len(), 2);
    let combined = outcome.tool_results.combined();
    assert!(combined.contains_key(&ToolResultKind::FileSearch));
    assert!(!combined.contains_key(&ToolResultKind::WebSearch));
}

#[tokio::test]
async fn test_interlocutor_sentinel_ends_run_early() {
    let mut config = run_config(BackendKind::ChatCompletions, 5);
    config.interlocutor = InterlocutorConfig {
        script: vec![
            "Can you check order 7?".to_string(),
            "Perfect, thank you! [end]".to_string(),
        ],
        ..Default::default()
    };

    let outcome = run(&config, &BackendRegistry::with_mocks()).await.unwrap();

    assert_eq!(outcome.status, ConversationStatus::Completed);
    assert_eq!(outcome.messages.len(), 4);
    assert_eq!(outcome.messages[2].content, "Can you check order 7?");
    assert!(outcome.messages.last().unwrap().role == MessageRole::Assistant);
}

#[tokio::test]
async fn test_live_config_without_key_fails_before_run() {
    let mut config = run_config(BackendKind::Responses, 1);
    config.backend = BackendConfig::new(BackendKind::Responses);

    let err = run(&config, &BackendRegistry::with_mocks()).await.unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)));
}

#[test]
fn test_unsupported_backend_rejected_at_parse_time() {
    let result: std::result::Result<RunConfig, _> = serde_json::from_value(json!({
        "directive": "customer",
        "backend": {"backend": "gemini", "mode": "mock"}
    }));
    let message = result.unwrap_err().to_string();
    assert!(message.contains("Unsupported backend"), "{message}");
}

/// Adapter that answers normally until `fail_on_turn`
struct FlakyAdapter {
    inner: ChatCompletionsAdapter,
    fail_on_turn: u32,
}

#[async_trait]
impl BackendAdapter for FlakyAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::ChatCompletions
    }

    async fn send_turn(&self, request: TurnRequest<'_>) -> Result<TurnOutcome> {
        if request.turn == self.fail_on_turn {
            return Err(EngineError::backend("APIConnectionError", "connection reset"));
        }
        self.inner.send_turn(request).await
    }
}

#[tokio::test]
async fn test_adapter_error_returns_partial_transcript() {
    let adapter = FlakyAdapter {
        inner: ChatCompletionsAdapter::new(
            Arc::new(MockChatCompletionsApi::new()),
            Arc::new(MockToolExecutor::new()),
            BackendConfig::mock(BackendKind::ChatCompletions),
        ),
        fail_on_turn: 2,
    };
    let orchestrator = ConversationOrchestrator::new(
        Box::new(adapter),
        InterlocutorSimulator::new(
            Arc::new(ScriptedDriver::new(vec!["And the refund?"])),
            LlmCallConfig::new("gpt-4o-mini"),
        ),
    );

    let outcome = orchestrator
        .run(&run_config(BackendKind::ChatCompletions, 3))
        .await;

    assert_eq!(outcome.status, ConversationStatus::Error);
    assert_eq!(outcome.error_class.as_deref(), Some("APIConnectionError"));
    assert!(outcome.error.as_deref().unwrap().contains("connection reset"));
    // Turn 1 pair plus the unanswered turn 2 user message
    assert_eq!(outcome.messages.len(), 3);
    assert_eq!(outcome.messages[2].role, MessageRole::User);
    assert_eq!(outcome.messages[2].turn, 2);
}

#[tokio::test]
async fn test_tool_bound_exhaustion_is_degraded_not_failed() {
    let api = Arc::new(MockChatCompletionsApi::new());
    for n in 1..=3 {
        api.push_response(json!({
            "id": format!("chatcmpl-tool-{n}"),
            "choices": [{"message": {"role": "assistant", "content": null, "tool_calls": [
                {"id": format!("call_{n}"), "type": "function",
                 "function": {"name": "lookup_order", "arguments": "{}"}}
            ]}, "finish_reason": "tool_calls"}]
        }))
        .await;
    }

    let config = BackendConfig::mock(BackendKind::ChatCompletions)
        .with_tools(vec![ToolDefinition::function(
            "lookup_order",
            "Look up an order",
            json!({"type": "object"}),
        )])
        .with_max_tool_iterations(2);
    let adapter = ChatCompletionsAdapter::new(api, Arc::new(MockToolExecutor::new()), config);
    let orchestrator = ConversationOrchestrator::new(
        Box::new(adapter),
        InterlocutorSimulator::new(
            Arc::new(ScriptedDriver::new(Vec::<String>::new())),
            LlmCallConfig::new("gpt-4o-mini"),
        ),
    );

    let outcome = orchestrator
        .run(&run_config(BackendKind::ChatCompletions, 1))
        .await;

    assert_eq!(outcome.status, ConversationStatus::Completed);
    assert_eq!(outcome.degraded_turns, vec![1]);
    assert_eq!(outcome.raw_responses.len(), 3);
    let reply = &outcome.messages[1];
    let ids: Vec<&str> = reply.tool_calls.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["call_1", "call_2", "call_3"]);
}

#[tokio::test]
async fn test_eligible_scorers_follow_run_backend() {
    let scorers: EvaluatorRegistry = [
        ScorerDescriptor::new("tone", ApiTypeTag::Conversational),
        ScorerDescriptor::new("grounding", ApiTypeTag::AssistantsOnly),
    ]
    .into_iter()
    .collect();

    let config = run_config(BackendKind::ChatCompletions, 1);
    let outcome = run(&config, &BackendRegistry::with_mocks()).await.unwrap();
    let eligible: Vec<&str> = scorers
        .eligible(config.mode, outcome.backend)
        .into_iter()
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(eligible, vec!["tone"]);

    // Normalized responses from any backend carry non-null text
    assert_eq!(NormalizedResponse::default().text, "");
}
