// Backend adapters
//
// One adapter per protocol family, all behind the `BackendAdapter` trait:
// - chat: stateless, resends the full history every turn
// - responses: stateful, chains turns through `previous_response_id`
// - assistants: asynchronous thread/run protocol with bounded polling
//
// Adapters talk to the network only through the transport traits below. Live
// transports live in provider crates; deterministic fakes live in `memory`.
// Which one an adapter gets is decided once, when it is constructed.

mod assistants;
mod chat;
mod responses;

pub use assistants::{poll_run_until_terminal, AssistantsAdapter, RunPoll};
pub use chat::ChatCompletionsAdapter;
pub use responses::ResponsesAdapter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::error::{EngineError, Result};
use crate::function_calls::FunctionCallOutcome;
use crate::normalized::{NormalizedResponse, UsageTotals};
use crate::normalizer::{normalizer_for, NormalizerKind, ResponseNormalizer};
use crate::state::{ContinuationToken, ConversationState};
use crate::tool_results::ToolResults;
use crate::wire::assistants::{CreateRunRequest, ToolOutput};
use crate::wire::chat::ChatCompletionRequest;
use crate::wire::responses::ResponsesRequest;

// ============================================================================
// BackendKind
// ============================================================================

/// Backend protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum BackendKind {
    ChatCompletions,
    Responses,
    Assistants,
}

impl BackendKind {
    /// Normalizer for this backend's raw payloads
    pub fn normalizer_kind(&self) -> NormalizerKind {
        match self {
            BackendKind::ChatCompletions => NormalizerKind::Chat,
            BackendKind::Responses => NormalizerKind::Responses,
            BackendKind::Assistants => NormalizerKind::Assistants,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::ChatCompletions => "chat_completions",
            BackendKind::Responses => "responses",
            BackendKind::Assistants => "assistants",
        }
    }
}

impl FromStr for BackendKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "chat" | "chat_completions" => Ok(BackendKind::ChatCompletions),
            "responses" => Ok(BackendKind::Responses),
            "assistants" | "threads" => Ok(BackendKind::Assistants),
            _ => Err(EngineError::UnsupportedBackend(s.to_string())),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Transport traits
// ============================================================================

/// Stateless chat completions endpoint
#[async_trait]
pub trait ChatCompletionsApi: Send + Sync {
    async fn create_chat_completion(&self, request: &ChatCompletionRequest) -> Result<Value>;
}

/// Chained responses endpoint
#[async_trait]
pub trait ResponsesApi: Send + Sync {
    async fn create_response(&self, request: &ResponsesRequest) -> Result<Value>;
}

/// Thread/run resources
#[async_trait]
pub trait AssistantsApi: Send + Sync {
    async fn create_thread(&self) -> Result<Value>;

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<Value>;

    async fn create_run(&self, thread_id: &str, request: &CreateRunRequest) -> Result<Value>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Value>;

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Value>;

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Value>;

    /// Run steps of a run (list page)
    async fn list_run_steps(&self, thread_id: &str, run_id: &str) -> Result<Value>;

    /// Messages created by a run (list page)
    async fn list_run_messages(&self, thread_id: &str, run_id: &str) -> Result<Value>;
}

// ============================================================================
// BackendAdapter
// ============================================================================

/// Input for one backend turn
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    pub turn: u32,
    pub user_message: &'a str,
    pub system_directive: Option<&'a str>,
    /// Conversation so far; messages of the current turn are not resent
    pub state: &'a ConversationState,
}

/// Result of one backend turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Assistant response for the turn (tool calls and typed results span
    /// every round-trip of the turn)
    pub response: NormalizedResponse,
    /// Every raw payload received during the turn
    pub raw_responses: Vec<Value>,
    pub usage: UsageTotals,
    /// Continuation token to carry into the next turn
    pub continuation: ContinuationToken,
    /// Tool iteration bound hit with calls still pending
    pub degraded: bool,
}

/// Protocol-specific request/response cycle for one turn
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn normalizer(&self) -> &'static dyn ResponseNormalizer {
        normalizer_for(self.kind().normalizer_kind())
    }

    /// Send the user message and resolve any tool calls
    async fn send_turn(&self, request: TurnRequest<'_>) -> Result<TurnOutcome>;

    /// Server-side conversation handle created so far, including one created
    /// by a turn that later failed
    async fn established_continuation(&self) -> Option<ContinuationToken> {
        None
    }
}

pub type BoxedBackendAdapter = Box<dyn BackendAdapter>;

#[async_trait]
impl BackendAdapter for Box<dyn BackendAdapter> {
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    async fn send_turn(&self, request: TurnRequest<'_>) -> Result<TurnOutcome> {
        (**self).send_turn(request).await
    }

    async fn established_continuation(&self) -> Option<ContinuationToken> {
        (**self).established_continuation().await
    }
}

/// Fold a tool-loop outcome into the turn's assistant response.
///
/// Text and metadata come from the final response; tool calls, typed results
/// and usage span every response of the turn. Tool calls were deduplicated
/// per response by the loop, so an id reused by a later iteration is kept.
pub(crate) fn assemble_turn(
    normalizer: &dyn ResponseNormalizer,
    outcome: &FunctionCallOutcome,
) -> NormalizedResponse {
    let results = ToolResults::extract_raw(normalizer, &outcome.all_responses);
    let final_response = normalizer.normalize_single_response(&outcome.final_response);

    NormalizedResponse {
        text: final_response.text,
        tool_calls: outcome.all_tool_calls.clone(),
        usage: Some(outcome.usage),
        web_search_results: results.web_search,
        code_interpreter_results: results.code_interpreter,
        file_search_results: results.file_search,
        metadata: final_response.metadata,
    }
}
