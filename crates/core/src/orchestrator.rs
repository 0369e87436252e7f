// Conversation orchestrator
//
// Drives one simulated conversation: for each turn, obtain the user message
// (caller-supplied on turn 1, interlocutor afterwards), append it, send it
// through the backend adapter and append the assistant reply. The run ends at
// `max_turns` or when the interlocutor signals termination; neither is an
// error.
//
// Any adapter or interlocutor failure aborts the run. The outcome still
// carries the partial transcript, with the error message and class recorded.
// There is no retry at this layer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::backends::{BackendAdapter, BackendKind, BoxedBackendAdapter, TurnRequest};
use crate::config::RunConfig;
use crate::error::Result;
use crate::evaluators::RunMode;
use crate::function_calls::ToolExecutor;
use crate::interlocutor::InterlocutorSimulator;
use crate::llm_driver::LlmCallConfig;
use crate::memory::MockToolExecutor;
use crate::normalized::{MessageMetadata, NormalizedMessage, UsageTotals};
use crate::registry::BackendRegistry;
use crate::state::{ContinuationToken, ConversationState, ConversationStatus};
use crate::telemetry::{run_span, turn_span};
use crate::tokens::aggregate_from_messages;
use crate::tool_results::ToolResults;

/// Result of one conversation run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub backend: BackendKind,
    /// Transcript, partial when the run errored
    pub messages: Vec<NormalizedMessage>,
    pub status: ConversationStatus,
    /// Continuation handle after the last completed turn, or the handle a
    /// failed first turn created
    pub continuation_token: ContinuationToken,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
    /// Every raw backend payload, in arrival order
    pub raw_responses: Vec<Value>,
    /// Summed assistant usage; absent when no reply carried usage
    pub usage: Option<UsageTotals>,
    pub tool_results: ToolResults,
    /// Turns whose tool loop hit its iteration bound with calls pending
    pub degraded_turns: Vec<u32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ConversationStatus::Completed
    }

    /// Number of user turns in the transcript
    pub fn turns(&self) -> u32 {
        self.messages.iter().map(|m| m.turn).max().unwrap_or(0)
    }
}

/// Everything accumulated while a run progresses
#[derive(Debug, Default)]
struct RunProgress {
    state: ConversationState,
    raw_responses: Vec<Value>,
    tool_results: ToolResults,
    degraded_turns: Vec<u32>,
}

/// Runs simulated conversations against one backend adapter
pub struct ConversationOrchestrator {
    adapter: BoxedBackendAdapter,
    simulator: InterlocutorSimulator,
}

impl std::fmt::Debug for ConversationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationOrchestrator")
            .field("backend", &self.adapter.kind())
            .field("simulator", &self.simulator)
            .finish()
    }
}

impl ConversationOrchestrator {
    pub fn new(adapter: BoxedBackendAdapter, simulator: InterlocutorSimulator) -> Self {
        Self { adapter, simulator }
    }

    /// Build the adapter and interlocutor for `config` from the registry.
    ///
    /// Fails before any network call on configuration problems (missing
    /// credentials, unregistered backend).
    pub fn from_config(
        config: &RunConfig,
        registry: &BackendRegistry,
        executor: Arc<dyn ToolExecutor>,
    ) -> Result<Self> {
        let adapter = registry.create_adapter(&config.backend, executor)?;
        let driver = registry.create_interlocutor(&config.interlocutor, config.backend.mode)?;

        let mut llm_config = LlmCallConfig::new(config.interlocutor.model.clone());
        if let Some(temperature) = config.interlocutor.temperature {
            llm_config = llm_config.with_temperature(temperature);
        }
        Ok(Self::new(adapter, InterlocutorSimulator::new(driver, llm_config)))
    }

    pub fn backend(&self) -> BackendKind {
        self.adapter.kind()
    }

    /// Run one conversation to completion, early termination or error
    pub async fn run(&self, config: &RunConfig) -> RunOutcome {
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        let max_turns = match config.mode {
            RunMode::SingleTurn => config.max_turns.min(1),
            RunMode::Conversational => config.max_turns,
        };

        info!(
            run_id = %run_id,
            backend = %self.backend(),
            mode = %config.mode,
            max_turns,
            "Starting conversation run"
        );

        let mut progress = RunProgress::default();
        let result = self
            .drive(config, max_turns, &mut progress)
            .instrument(run_span(run_id, self.backend()))
            .await;

        let (status, error_message, error_class) = match result {
            Ok(()) => (ConversationStatus::Completed, None, None),
            Err(e) => {
                if progress.state.continuation.is_none() {
                    if let Some(token) = self.adapter.established_continuation().await {
                        progress.state.continuation = token;
                    }
                }
                error!(
                    run_id = %run_id,
                    turn = progress.state.turn,
                    error_class = e.class(),
                    error = %e,
                    "Conversation run aborted"
                );
                (
                    ConversationStatus::Error,
                    Some(e.to_string()),
                    Some(e.class().to_string()),
                )
            }
        };
        progress.state.status = Some(status);

        let RunProgress {
            state,
            raw_responses,
            tool_results,
            degraded_turns,
        } = progress;
        let outcome = RunOutcome {
            run_id,
            backend: self.backend(),
            usage: aggregate_from_messages(&state.messages),
            messages: state.messages,
            status,
            continuation_token: state.continuation,
            error: error_message,
            error_class,
            raw_responses,
            tool_results,
            degraded_turns,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            run_id = %run_id,
            status = %outcome.status,
            turns = outcome.turns(),
            messages = outcome.messages.len(),
            "Conversation run finished"
        );
        outcome
    }

    async fn drive(
        &self,
        config: &RunConfig,
        max_turns: u32,
        progress: &mut RunProgress,
    ) -> Result<()> {
        for turn in 1..=max_turns {
            let first_message = config
                .first_message
                .as_deref()
                .map(str::trim)
                .filter(|m| turn == 1 && !m.is_empty());
            let user_message = match first_message {
                Some(message) => Some(message.to_string()),
                None => {
                    self.simulator
                        .generate_next_message(&config.directive, &progress.state.messages, turn)
                        .await?
                }
            };

            let Some(user_message) = user_message else {
                info!(turn, "Interlocutor ended the conversation");
                break;
            };

            progress.state.turn = turn;
            progress
                .state
                .messages
                .push(NormalizedMessage::user(user_message.as_str(), turn));
            debug!(turn, chars = user_message.len(), "Sending user turn");

            let outcome = self
                .adapter
                .send_turn(TurnRequest {
                    turn,
                    user_message: &user_message,
                    system_directive: config.system_directive.as_deref(),
                    state: &progress.state,
                })
                .instrument(turn_span(turn))
                .await?;

            if outcome.degraded {
                warn!(
                    turn,
                    pending_calls = outcome.response.tool_calls.len(),
                    "Turn completed with unresolved tool calls"
                );
                progress.degraded_turns.push(turn);
            }

            progress.tool_results.append(&outcome.response);
            progress.raw_responses.extend(outcome.raw_responses);

            let metadata = MessageMetadata {
                continuation: outcome.continuation.clone(),
                response_id: outcome.response.metadata.response_id.clone(),
                run_id: outcome.response.metadata.run_id.clone(),
            };
            progress
                .state
                .messages
                .push(NormalizedMessage::from_response(&outcome.response, turn).with_metadata(metadata));
            progress.state.continuation = outcome.continuation;
        }
        Ok(())
    }
}

/// Run a conversation from configuration alone.
///
/// Function tools are answered from the configured fixtures. Configuration
/// errors are returned before any call is made; failures during the run are
/// reported on the outcome.
pub async fn run(config: &RunConfig, registry: &BackendRegistry) -> Result<RunOutcome> {
    let executor = Arc::new(MockToolExecutor::with_fixtures(
        config.backend.mock_fixtures.clone(),
    ));
    let orchestrator = ConversationOrchestrator::from_config(config, registry, executor)?;
    Ok(orchestrator.run(config).await)
}
