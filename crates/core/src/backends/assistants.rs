// Thread/run polling adapter
//
// Per turn: create the thread (first turn only), append the user message,
// create a run against the pre-registered assistant, then poll until the run
// settles. `requires_action` hands the pending calls to the function-call
// loop, which submits outputs and polls again with a fresh attempt budget.
//
// Run state machine:
//   queued -> in_progress -> {completed | failed | cancelled | expired | incomplete}
//                  |
//                  +-> requires_action -> (submit outputs) -> in_progress
//
// On `completed` the run's messages and run steps are fetched and bundled
// into one payload for the assistants normalizer. A failed step fetch is a
// soft failure (empty step list).
//
// The adapter remembers the thread it created, so a turn that fails after
// thread creation still leaves the thread reachable through
// `established_continuation` and reused by the next turn.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{AssistantsApi, BackendAdapter, BackendKind, TurnOutcome, TurnRequest};
use crate::config::{BackendConfig, PollConfig};
use crate::error::{EngineError, Result};
use crate::function_calls::{FunctionCallHandler, ToolCallBackend, ToolExecutor};
use crate::normalizer::{normalizer_for, NormalizerKind, ResponseNormalizer};
use crate::state::ContinuationToken;
use crate::tool_types::{ToolCall, ToolExchange};
use crate::wire::assistants::{
    CreateRunRequest, ListPage, ObjectRef, ThreadRun, ThreadRunStatus, ToolOutput,
};
use crate::wire::parse_lenient;

/// A run that stopped changing on its own (terminal or waiting on tools)
#[derive(Debug, Clone)]
pub struct RunPoll {
    pub run: ThreadRun,
    pub raw: Value,
    /// Status retrievals performed
    pub attempts: u32,
}

/// Poll a run until it is terminal or requires action.
///
/// The first retrieval happens immediately; the fixed interval is slept only
/// between retrievals. A failed retrieval counts as an attempt and is retried,
/// unless the error is not retryable (rejected credentials or permissions),
/// which is returned at once. Exhausting `max_attempts` yields
/// `EngineError::PollTimeout`.
pub async fn poll_run_until_terminal(
    api: &dyn AssistantsApi,
    thread_id: &str,
    run_id: &str,
    poll: &PollConfig,
) -> Result<RunPoll> {
    let mut last_status = String::from("unknown");

    for attempt in 1..=poll.max_attempts {
        if attempt > 1 {
            tokio::time::sleep(poll.interval()).await;
        }

        let raw = match api.retrieve_run(thread_id, run_id).await {
            Ok(raw) => raw,
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                warn!(
                    run_id = %run_id,
                    attempt,
                    error = %e,
                    "Failed to retrieve run status, will retry"
                );
                continue;
            }
        };

        let run: ThreadRun = parse_lenient(&raw);
        debug!(run_id = %run_id, attempt, status = %run.status, "Polled run status");

        if run.status.is_terminal() || run.status == ThreadRunStatus::RequiresAction {
            return Ok(RunPoll {
                run,
                raw,
                attempts: attempt,
            });
        }
        last_status = run.status.to_string();
    }

    warn!(
        run_id = %run_id,
        attempts = poll.max_attempts,
        last_status = %last_status,
        "Run polling timed out"
    );
    Err(EngineError::PollTimeout {
        attempts: poll.max_attempts,
        interval_ms: poll.interval_ms,
        last_status,
    })
}

/// Adapter for the thread/run polling protocol
pub struct AssistantsAdapter {
    api: Arc<dyn AssistantsApi>,
    config: BackendConfig,
    assistant_id: String,
    tool_handler: FunctionCallHandler,
    /// Thread created by this adapter
    thread_id: RwLock<Option<String>>,
}

impl std::fmt::Debug for AssistantsAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantsAdapter")
            .field("assistant_id", &self.assistant_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AssistantsAdapter {
    /// Fails when no assistant id is configured
    pub fn new(
        api: Arc<dyn AssistantsApi>,
        executor: Arc<dyn ToolExecutor>,
        config: BackendConfig,
    ) -> Result<Self> {
        let assistant_id = config
            .assistant_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| EngineError::config("assistants backend requires an assistant_id"))?;
        let tool_handler = FunctionCallHandler::new(executor, config.max_tool_iterations);
        Ok(Self {
            api,
            config,
            assistant_id,
            tool_handler,
            thread_id: RwLock::new(None),
        })
    }

    async fn ensure_thread(&self, continuation: &ContinuationToken) -> Result<String> {
        if let Some(thread_id) = continuation.thread_id() {
            return Ok(thread_id.to_string());
        }
        let mut created = self.thread_id.write().await;
        if let Some(thread_id) = created.as_ref() {
            debug!(thread_id = %thread_id, "Reusing thread from an earlier failed turn");
            return Ok(thread_id.clone());
        }
        let raw = self.api.create_thread().await?;
        let thread: ObjectRef = parse_lenient(&raw);
        if thread.id.is_empty() {
            return Err(EngineError::protocol("created thread has no id"));
        }
        info!(thread_id = %thread.id, "Created thread");
        *created = Some(thread.id.clone());
        Ok(thread.id)
    }

    async fn fetch_run_steps(&self, thread_id: &str, run_id: &str) -> Vec<Value> {
        match self.api.list_run_steps(thread_id, run_id).await {
            Ok(raw) => parse_lenient::<ListPage<Value>>(&raw).data,
            Err(e) => {
                warn!(
                    thread_id = %thread_id,
                    run_id = %run_id,
                    error = %e,
                    "Failed to fetch run steps, continuing without them"
                );
                Vec::new()
            }
        }
    }
}

/// Tool round-trip state for one run
struct AssistantsToolRound<'a> {
    api: &'a dyn AssistantsApi,
    thread_id: &'a str,
    run_id: &'a str,
    poll: PollConfig,
}

#[async_trait]
impl ToolCallBackend for AssistantsToolRound<'_> {
    fn normalizer(&self) -> &dyn ResponseNormalizer {
        normalizer_for(NormalizerKind::Assistants)
    }

    fn pending_tool_calls(&self, raw: &Value) -> Vec<ToolCall> {
        let run: ThreadRun = parse_lenient(raw);
        run.pending_tool_calls()
            .iter()
            .map(|c| c.to_tool_call())
            .collect()
    }

    async fn submit_tool_outputs(
        &mut self,
        _previous: &Value,
        exchanges: &[ToolExchange],
    ) -> Result<Value> {
        let outputs: Vec<ToolOutput> = exchanges
            .iter()
            .map(|e| ToolOutput {
                tool_call_id: e.call.id.clone(),
                output: e.output_string(),
            })
            .collect();
        debug!(run_id = %self.run_id, outputs = outputs.len(), "Submitting tool outputs");
        self.api
            .submit_tool_outputs(self.thread_id, self.run_id, &outputs)
            .await?;

        let settled =
            poll_run_until_terminal(self.api, self.thread_id, self.run_id, &self.poll).await?;
        Ok(settled.raw)
    }
}

#[async_trait]
impl BackendAdapter for AssistantsAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Assistants
    }

    async fn send_turn(&self, request: TurnRequest<'_>) -> Result<TurnOutcome> {
        let thread_id = self.ensure_thread(&request.state.continuation).await?;
        self.api
            .create_message(&thread_id, request.user_message)
            .await?;

        let run_request = CreateRunRequest {
            assistant_id: self.assistant_id.clone(),
            additional_instructions: request
                .system_directive
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            temperature: self.config.temperature,
        };
        let created: ObjectRef =
            parse_lenient(&self.api.create_run(&thread_id, &run_request).await?);
        if created.id.is_empty() {
            return Err(EngineError::protocol("created run has no id"));
        }
        let run_id = created.id;

        info!(
            backend = %self.kind(),
            turn = request.turn,
            thread_id = %thread_id,
            run_id = %run_id,
            "Created run"
        );

        let settled =
            poll_run_until_terminal(self.api.as_ref(), &thread_id, &run_id, &self.config.poll)
                .await?;
        debug!(run_id = %run_id, attempts = settled.attempts, status = %settled.run.status, "Run settled");

        let mut round = AssistantsToolRound {
            api: self.api.as_ref(),
            thread_id: &thread_id,
            run_id: &run_id,
            poll: self.config.poll,
        };
        let outcome = self.tool_handler.resolve(&mut round, settled.raw).await?;
        let final_run: ThreadRun = parse_lenient(&outcome.final_response);

        let (messages, run_steps) = if outcome.exhausted {
            if let Err(e) = self.api.cancel_run(&thread_id, &run_id).await {
                warn!(run_id = %run_id, error = %e, "Failed to cancel run left waiting on tools");
            }
            (Vec::new(), Vec::new())
        } else if final_run.status == ThreadRunStatus::Completed {
            let page = self.api.list_run_messages(&thread_id, &run_id).await?;
            let messages = parse_lenient::<ListPage<Value>>(&page).data;
            (messages, self.fetch_run_steps(&thread_id, &run_id).await)
        } else {
            return Err(EngineError::RunFailed {
                run_id,
                status: final_run.status.to_string(),
                message: final_run.error_message(),
            });
        };

        let bundle = json!({
            "thread_id": thread_id,
            "run": outcome.final_response,
            "messages": messages,
            "run_steps": run_steps,
        });
        let mut response = self.normalizer().normalize_single_response(&bundle);
        // Run steps re-list the function calls the tool loop already answered
        if !outcome.all_tool_calls.is_empty() {
            response.tool_calls = outcome.all_tool_calls.clone();
        }

        // The final run object is carried inside the bundle
        let mut raw_responses = outcome.all_responses;
        raw_responses.pop();
        raw_responses.push(bundle);

        Ok(TurnOutcome {
            usage: response.usage.unwrap_or_default(),
            response,
            raw_responses,
            continuation: ContinuationToken::Thread {
                thread_id,
                run_id: Some(run_id),
            },
            degraded: outcome.exhausted,
        })
    }

    async fn established_continuation(&self) -> Option<ContinuationToken> {
        self.thread_id
            .read()
            .await
            .clone()
            .map(|thread_id| ContinuationToken::Thread {
                thread_id,
                run_id: None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FailingToolExecutor, MockAssistantsApi, MockToolExecutor};
    use crate::state::ConversationState;

    fn config() -> BackendConfig {
        BackendConfig::mock(BackendKind::Assistants)
            .with_assistant_id("asst_test")
            .with_poll(PollConfig::new(10, 5))
    }

    #[test]
    fn test_missing_assistant_id_is_configuration_error() {
        let err = AssistantsAdapter::new(
            Arc::new(MockAssistantsApi::new()),
            Arc::new(MockToolExecutor::new()),
            BackendConfig::mock(BackendKind::Assistants),
        )
        .unwrap_err();
        assert_eq!(err.class(), "ConfigurationError");
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_returns_after_terminal_status() {
        let api = MockAssistantsApi::new().with_status_sequence(vec![
            ThreadRunStatus::Queued,
            ThreadRunStatus::InProgress,
            ThreadRunStatus::InProgress,
            ThreadRunStatus::Completed,
        ]);
        let poll = poll_run_until_terminal(&api, "thread_mock", "run_mock_1", &PollConfig::new(1000, 60))
            .await
            .unwrap();
        assert_eq!(poll.attempts, 4);
        assert_eq!(poll.run.status, ThreadRunStatus::Completed);
        assert_eq!(api.poll_count().await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_timeout() {
        let api = MockAssistantsApi::new().with_status_sequence(vec![ThreadRunStatus::InProgress]);
        let err = poll_run_until_terminal(&api, "thread_mock", "run_mock_1", &PollConfig::new(1000, 3))
            .await
            .unwrap_err();
        match err {
            EngineError::PollTimeout {
                attempts,
                last_status,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_status, "in_progress");
            }
            other => panic!("expected poll timeout, got {other:?}"),
        }
        assert_eq!(api.poll_count().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_reuses_thread_and_fetches_steps() {
        let api = Arc::new(MockAssistantsApi::new());
        let adapter =
            AssistantsAdapter::new(api.clone(), Arc::new(MockToolExecutor::new()), config()).unwrap();

        let mut state = ConversationState::new();
        let first = adapter
            .send_turn(TurnRequest {
                turn: 1,
                user_message: "Hello",
                system_directive: None,
                state: &state,
            })
            .await
            .unwrap();
        assert_eq!(first.continuation.thread_id(), Some("thread_mock"));
        assert!(first.response.text.contains("Hello"));
        assert_eq!(first.response.file_search_results.len(), 1);
        assert_eq!(first.usage.total_tokens, 30);

        state.continuation = first.continuation;
        adapter
            .send_turn(TurnRequest {
                turn: 2,
                user_message: "Again",
                system_directive: None,
                state: &state,
            })
            .await
            .unwrap();
        assert_eq!(api.threads_created().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_steps_are_soft_failure() {
        let api = Arc::new(MockAssistantsApi::new().with_failing_run_steps());
        let adapter =
            AssistantsAdapter::new(api, Arc::new(MockToolExecutor::new()), config()).unwrap();
        let state = ConversationState::new();
        let outcome = adapter
            .send_turn(TurnRequest {
                turn: 1,
                user_message: "Hello",
                system_directive: None,
                state: &state,
            })
            .await
            .unwrap();
        assert!(outcome.response.file_search_results.is_empty());
        assert!(!outcome.response.text.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_is_error() {
        let api = Arc::new(
            MockAssistantsApi::new()
                .with_status_sequence(vec![ThreadRunStatus::InProgress, ThreadRunStatus::Failed]),
        );
        let adapter =
            AssistantsAdapter::new(api, Arc::new(MockToolExecutor::new()), config()).unwrap();
        let state = ConversationState::new();
        let err = adapter
            .send_turn(TurnRequest {
                turn: 1,
                user_message: "Hello",
                system_directive: None,
                state: &state,
            })
            .await
            .unwrap_err();
        assert_eq!(err.class(), "RunFailed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_requires_action_submits_outputs() {
        let api = Arc::new(MockAssistantsApi::new().with_tool_call("lookup_order", r#"{"id": 7}"#));
        let executor = Arc::new(MockToolExecutor::new());
        executor
            .set_result("lookup_order", json!({"status": "shipped"}))
            .await;
        let adapter = AssistantsAdapter::new(api.clone(), executor.clone(), config()).unwrap();
        let state = ConversationState::new();

        let outcome = adapter
            .send_turn(TurnRequest {
                turn: 1,
                user_message: "Where is order 7?",
                system_directive: Some("Answer as a support agent"),
                state: &state,
            })
            .await
            .unwrap();

        let run_requests = api.run_requests().await;
        assert_eq!(run_requests.len(), 1);
        assert_eq!(run_requests[0].assistant_id, "asst_test");
        assert_eq!(
            run_requests[0].additional_instructions.as_deref(),
            Some("Answer as a support agent")
        );

        let submitted = api.submitted_outputs().await;
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0][0].tool_call_id, "call_mock_1");
        assert_eq!(submitted[0][0].output, r#"{"status":"shipped"}"#);
        assert_eq!(executor.calls().await.len(), 1);
        assert_eq!(outcome.response.tool_calls.len(), 1);
        assert_eq!(outcome.response.tool_calls[0].name, "lookup_order");
        assert!(!outcome.degraded);
        assert!(api.cancelled_runs().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_system_directive_is_not_sent() {
        let api = Arc::new(MockAssistantsApi::new());
        let adapter =
            AssistantsAdapter::new(api.clone(), Arc::new(MockToolExecutor::new()), config()).unwrap();
        let state = ConversationState::new();
        adapter
            .send_turn(TurnRequest {
                turn: 1,
                user_message: "Hello",
                system_directive: Some(""),
                state: &state,
            })
            .await
            .unwrap();
        assert!(api.run_requests().await[0].additional_instructions.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_bound_cancels_run_and_degrades_turn() {
        let api = Arc::new(
            MockAssistantsApi::new()
                .with_tool_call("lookup_order", r#"{"id": 7}"#)
                .with_tool_rounds(3),
        );
        let adapter = AssistantsAdapter::new(
            api.clone(),
            Arc::new(MockToolExecutor::new()),
            config().with_max_tool_iterations(1),
        )
        .unwrap();
        let state = ConversationState::new();

        let outcome = adapter
            .send_turn(TurnRequest {
                turn: 1,
                user_message: "Where is order 7?",
                system_directive: None,
                state: &state,
            })
            .await
            .unwrap();

        assert!(outcome.degraded);
        assert_eq!(api.cancelled_runs().await, vec!["run_mock_1".to_string()]);
        assert_eq!(api.submitted_outputs().await.len(), 1);
        assert!(outcome.response.text.is_empty());
        // The answered call and the one left pending share an id
        assert_eq!(outcome.response.tool_calls.len(), 2);
        assert!(outcome
            .response
            .tool_calls
            .iter()
            .all(|call| call.id == "call_mock_1"));
        assert_eq!(outcome.continuation.thread_id(), Some("thread_mock"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_tool_is_submitted_as_error_output() {
        let api = Arc::new(MockAssistantsApi::new().with_tool_call("lookup_order", r#"{"id": 7}"#));
        let adapter = AssistantsAdapter::new(
            api.clone(),
            Arc::new(FailingToolExecutor::new("orders database offline")),
            config(),
        )
        .unwrap();
        let state = ConversationState::new();

        let outcome = adapter
            .send_turn(TurnRequest {
                turn: 1,
                user_message: "Where is order 7?",
                system_directive: None,
                state: &state,
            })
            .await
            .unwrap();

        let submitted = api.submitted_outputs().await;
        assert!(submitted[0][0].output.contains("orders database offline"));
        assert!(!outcome.degraded);
        assert!(!outcome.response.text.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_stops_on_rejected_credentials() {
        let api = MockAssistantsApi::new().with_failing_retrieve("AuthenticationError");
        let err = poll_run_until_terminal(&api, "thread_mock", "run_mock_1", &PollConfig::new(1000, 5))
            .await
            .unwrap_err();
        assert_eq!(err.class(), "AuthenticationError");
        assert_eq!(api.poll_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_retries_connection_errors_until_timeout() {
        let api = MockAssistantsApi::new().with_failing_retrieve("APIConnectionError");
        let err = poll_run_until_terminal(&api, "thread_mock", "run_mock_1", &PollConfig::new(1000, 3))
            .await
            .unwrap_err();
        assert_eq!(err.class(), "PollTimeout");
        assert_eq!(api.poll_count().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_thread_survives_failed_first_turn() {
        let api = Arc::new(
            MockAssistantsApi::new().with_status_sequence(vec![ThreadRunStatus::Failed]),
        );
        let adapter =
            AssistantsAdapter::new(api.clone(), Arc::new(MockToolExecutor::new()), config()).unwrap();
        let state = ConversationState::new();
        assert!(adapter.established_continuation().await.is_none());

        let request = TurnRequest {
            turn: 1,
            user_message: "Hello",
            system_directive: None,
            state: &state,
        };
        assert!(adapter.send_turn(request).await.is_err());

        let continuation = adapter.established_continuation().await.unwrap();
        assert_eq!(continuation.thread_id(), Some("thread_mock"));

        assert!(adapter.send_turn(request).await.is_err());
        assert_eq!(api.threads_created().await, 1);
    }
}
