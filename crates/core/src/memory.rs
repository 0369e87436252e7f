// In-memory backends for mock mode and testing
//
// Deterministic stand-ins for every transport seam: the three backend
// protocols, the interlocutor driver and the tool executor. Replies are
// derived from the request, so the same run always produces the same
// transcript. Each fake keeps a log of what it was asked so tests can
// assert on the exact wire traffic.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::backends::{AssistantsApi, ChatCompletionsApi, ResponsesApi};
use crate::error::{EngineError, Result};
use crate::function_calls::ToolExecutor;
use crate::llm_driver::{LlmCallConfig, LlmDriver, LlmMessage, LlmResponse};
use crate::normalized::UsageTotals;
use crate::tool_types::ToolCall;
use crate::wire::assistants::{CreateRunRequest, ThreadRunStatus, ToolOutput};
use crate::wire::chat::ChatCompletionRequest;
use crate::wire::responses::{ResponsesInput, ResponsesRequest};

/// Usage reported by every generated mock reply
pub const MOCK_USAGE: UsageTotals = UsageTotals {
    prompt_tokens: 10,
    completion_tokens: 20,
    total_tokens: 30,
};

/// Assistant text the fakes produce for a user message
pub fn mock_reply(user_message: &str) -> String {
    format!("Mock response to: {user_message}")
}

// ============================================================================
// MockChatCompletionsApi - stateless chat protocol
// ============================================================================

/// Chat completions fake.
///
/// Scripted payloads (see [`push_response`](Self::push_response)) are served
/// first; afterwards each call generates `chatcmpl-mock-N` echoing the last
/// user message.
#[derive(Debug, Default)]
pub struct MockChatCompletionsApi {
    scripted: Arc<RwLock<VecDeque<Value>>>,
    requests: Arc<RwLock<Vec<Value>>>,
    generated: Arc<RwLock<u32>>,
}

impl MockChatCompletionsApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw payload to return on the next call
    pub async fn push_response(&self, response: Value) {
        self.scripted.write().await.push_back(response);
    }

    /// Serialized requests received so far
    pub async fn requests(&self) -> Vec<Value> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl ChatCompletionsApi for MockChatCompletionsApi {
    async fn create_chat_completion(&self, request: &ChatCompletionRequest) -> Result<Value> {
        self.requests
            .write()
            .await
            .push(serde_json::to_value(request).unwrap_or_default());

        if let Some(scripted) = self.scripted.write().await.pop_front() {
            return Ok(scripted);
        }

        let mut generated = self.generated.write().await;
        *generated += 1;
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .and_then(|m| m.content.as_deref())
            .unwrap_or_default();

        Ok(json!({
            "id": format!("chatcmpl-mock-{}", *generated),
            "object": "chat.completion",
            "model": request.model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": mock_reply(last_user)},
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": MOCK_USAGE.prompt_tokens,
                "completion_tokens": MOCK_USAGE.completion_tokens,
                "total_tokens": MOCK_USAGE.total_tokens
            }
        }))
    }
}

// ============================================================================
// MockResponsesApi - response chaining protocol
// ============================================================================

/// Chained responses fake.
///
/// Generated ids are `resp_mock_N`, counting generated responses only.
#[derive(Debug, Default)]
pub struct MockResponsesApi {
    scripted: Arc<RwLock<VecDeque<Value>>>,
    requests: Arc<RwLock<Vec<Value>>>,
    generated: Arc<RwLock<u32>>,
}

impl MockResponsesApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw payload to return on the next call
    pub async fn push_response(&self, response: Value) {
        self.scripted.write().await.push_back(response);
    }

    /// Serialized requests received so far
    pub async fn requests(&self) -> Vec<Value> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl ResponsesApi for MockResponsesApi {
    async fn create_response(&self, request: &ResponsesRequest) -> Result<Value> {
        self.requests
            .write()
            .await
            .push(serde_json::to_value(request).unwrap_or_default());

        if let Some(scripted) = self.scripted.write().await.pop_front() {
            return Ok(scripted);
        }

        let mut generated = self.generated.write().await;
        *generated += 1;
        let text = match &request.input {
            ResponsesInput::Text(text) => mock_reply(text),
            ResponsesInput::Items(items) => format!("Received {} tool output items", items.len()),
        };

        Ok(json!({
            "id": format!("resp_mock_{}", *generated),
            "object": "response",
            "model": request.model,
            "status": "completed",
            "output": [{
                "type": "message",
                "role": "assistant",
                "content": [{"type": "output_text", "text": text, "annotations": []}]
            }],
            "usage": {
                "input_tokens": MOCK_USAGE.prompt_tokens,
                "output_tokens": MOCK_USAGE.completion_tokens,
                "total_tokens": MOCK_USAGE.total_tokens
            }
        }))
    }
}

// ============================================================================
// MockAssistantsApi - thread/run protocol
// ============================================================================

#[derive(Debug, Default)]
struct AssistantsState {
    threads_created: u32,
    runs_created: u32,
    /// Last user message per thread
    last_user: HashMap<String, String>,
    /// Polls since the run was created or last received tool outputs
    run_polls: HashMap<String, usize>,
    /// Tool output submissions received per run
    answered: HashMap<String, usize>,
    poll_count: u32,
    run_requests: Vec<CreateRunRequest>,
    submitted: Vec<Vec<ToolOutput>>,
    cancelled: Vec<String>,
}

/// Thread/run fake.
///
/// Every run walks the configured status sequence, one status per poll, and
/// stays on the last one. With a tool call configured, each run reports
/// `requires_action` until it has received outputs `tool_rounds` times.
#[derive(Debug)]
pub struct MockAssistantsApi {
    statuses: Vec<ThreadRunStatus>,
    tool_call: Option<(String, String)>,
    tool_rounds: usize,
    fail_run_steps: bool,
    retrieve_error: Option<String>,
    state: Arc<RwLock<AssistantsState>>,
}

impl Default for MockAssistantsApi {
    fn default() -> Self {
        Self {
            statuses: vec![ThreadRunStatus::InProgress, ThreadRunStatus::Completed],
            tool_call: None,
            tool_rounds: 1,
            fail_run_steps: false,
            retrieve_error: None,
            state: Arc::new(RwLock::new(AssistantsState::default())),
        }
    }
}

impl MockAssistantsApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses reported by successive polls of a run
    pub fn with_status_sequence(mut self, statuses: Vec<ThreadRunStatus>) -> Self {
        if !statuses.is_empty() {
            self.statuses = statuses;
        }
        self
    }

    /// Make each run request one function call before completing
    pub fn with_tool_call(mut self, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        self.tool_call = Some((name.into(), arguments.into()));
        self
    }

    /// Keep asking for the tool call until `rounds` submissions arrived
    pub fn with_tool_rounds(mut self, rounds: usize) -> Self {
        self.tool_rounds = rounds;
        self
    }

    /// Make every status retrieval fail with a backend error of `class`
    pub fn with_failing_retrieve(mut self, class: impl Into<String>) -> Self {
        self.retrieve_error = Some(class.into());
        self
    }

    /// Make run step listing fail
    pub fn with_failing_run_steps(mut self) -> Self {
        self.fail_run_steps = true;
        self
    }

    pub async fn threads_created(&self) -> u32 {
        self.state.read().await.threads_created
    }

    /// Total status retrievals across all runs
    pub async fn poll_count(&self) -> u32 {
        self.state.read().await.poll_count
    }

    /// Run creation requests, in order
    pub async fn run_requests(&self) -> Vec<CreateRunRequest> {
        self.state.read().await.run_requests.clone()
    }

    /// Tool outputs submitted, one entry per submission
    pub async fn submitted_outputs(&self) -> Vec<Vec<ToolOutput>> {
        self.state.read().await.submitted.clone()
    }

    /// Ids of runs cancelled so far
    pub async fn cancelled_runs(&self) -> Vec<String> {
        self.state.read().await.cancelled.clone()
    }

    fn run_object(&self, thread_id: &str, run_id: &str, status: ThreadRunStatus) -> Value {
        let mut run = json!({
            "id": run_id,
            "object": "thread.run",
            "thread_id": thread_id,
            "status": status.as_str(),
            "required_action": null,
            "last_error": null,
            "usage": null
        });
        match status {
            ThreadRunStatus::RequiresAction => {
                let (name, arguments) = self.tool_call.clone().unwrap_or_default();
                run["required_action"] = json!({
                    "type": "submit_tool_outputs",
                    "submit_tool_outputs": {"tool_calls": [{
                        "id": "call_mock_1",
                        "type": "function",
                        "function": {"name": name, "arguments": arguments}
                    }]}
                });
            }
            ThreadRunStatus::Completed => {
                run["usage"] = json!({
                    "prompt_tokens": MOCK_USAGE.prompt_tokens,
                    "completion_tokens": MOCK_USAGE.completion_tokens,
                    "total_tokens": MOCK_USAGE.total_tokens
                });
            }
            ThreadRunStatus::Failed => {
                run["last_error"] = json!({"code": "server_error", "message": "mock run failed"});
            }
            _ => {}
        }
        run
    }
}

fn thread_mock_id() -> String {
    "thread_mock".to_string()
}

#[async_trait]
impl AssistantsApi for MockAssistantsApi {
    async fn create_thread(&self) -> Result<Value> {
        self.state.write().await.threads_created += 1;
        Ok(json!({"id": thread_mock_id(), "object": "thread"}))
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<Value> {
        self.state
            .write()
            .await
            .last_user
            .insert(thread_id.to_string(), content.to_string());
        Ok(json!({
            "id": "msg_user_mock",
            "object": "thread.message",
            "thread_id": thread_id,
            "role": "user",
            "content": [{"type": "text", "text": {"value": content, "annotations": []}}]
        }))
    }

    async fn create_run(&self, thread_id: &str, request: &CreateRunRequest) -> Result<Value> {
        let mut state = self.state.write().await;
        state.runs_created += 1;
        state.run_requests.push(request.clone());
        let run_id = format!("run_mock_{}", state.runs_created);
        Ok(json!({
            "id": run_id,
            "object": "thread.run",
            "thread_id": thread_id,
            "assistant_id": request.assistant_id,
            "status": "queued"
        }))
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Value> {
        let mut state = self.state.write().await;
        state.poll_count += 1;
        if let Some(class) = &self.retrieve_error {
            return Err(EngineError::backend(class.clone(), "run retrieval rejected"));
        }
        let answered = state.answered.get(run_id).copied().unwrap_or_default();
        let polls = state.run_polls.entry(run_id.to_string()).or_default();
        let index = *polls;
        *polls += 1;

        let status = if self.tool_call.is_some() && answered < self.tool_rounds {
            ThreadRunStatus::RequiresAction
        } else {
            self.statuses[index.min(self.statuses.len() - 1)]
        };
        Ok(self.run_object(thread_id, run_id, status))
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Value> {
        let mut state = self.state.write().await;
        state.submitted.push(outputs.to_vec());
        *state.answered.entry(run_id.to_string()).or_default() += 1;
        state.run_polls.insert(run_id.to_string(), 0);
        Ok(self.run_object(thread_id, run_id, ThreadRunStatus::Queued))
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Value> {
        self.state.write().await.cancelled.push(run_id.to_string());
        Ok(self.run_object(thread_id, run_id, ThreadRunStatus::Cancelling))
    }

    async fn list_run_steps(&self, _thread_id: &str, run_id: &str) -> Result<Value> {
        if self.fail_run_steps {
            return Err(EngineError::backend("APIError", "run steps unavailable"));
        }
        Ok(json!({
            "object": "list",
            "data": [{
                "id": format!("step_{run_id}"),
                "object": "thread.run.step",
                "run_id": run_id,
                "type": "tool_calls",
                "step_details": {
                    "type": "tool_calls",
                    "tool_calls": [{
                        "id": "fs_mock_1",
                        "type": "file_search",
                        "file_search": {"results": [{
                            "file_id": "file_mock_1",
                            "file_name": "handbook.md",
                            "score": 0.92,
                            "content": [{"type": "text", "text": "Orders ship within two days."}]
                        }]}
                    }]
                }
            }],
            "has_more": false
        }))
    }

    async fn list_run_messages(&self, thread_id: &str, run_id: &str) -> Result<Value> {
        let state = self.state.read().await;
        let user = state.last_user.get(thread_id).cloned().unwrap_or_default();
        Ok(json!({
            "object": "list",
            "data": [{
                "id": format!("msg_{run_id}"),
                "object": "thread.message",
                "thread_id": thread_id,
                "run_id": run_id,
                "role": "assistant",
                "created_at": state.runs_created,
                "content": [{"type": "text", "text": {"value": mock_reply(&user), "annotations": []}}]
            }],
            "has_more": false
        }))
    }
}

// ============================================================================
// ScriptedDriver - interlocutor driver
// ============================================================================

/// Interlocutor driver replaying a fixed script.
///
/// Once the script runs out, it produces numbered follow-up questions so a
/// mock run always reaches `max_turns` unless the script says `[END]`.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    replies: Arc<RwLock<VecDeque<String>>>,
    failure: Option<String>,
    call_log: Arc<RwLock<Vec<Vec<LlmMessage>>>>,
}

impl ScriptedDriver {
    pub fn new<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self {
            replies: Arc::new(RwLock::new(replies.into_iter().map(Into::into).collect())),
            ..Self::default()
        }
    }

    /// Driver whose every call fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub async fn call_count(&self) -> usize {
        self.call_log.read().await.len()
    }

    /// Prompts received so far
    pub async fn calls(&self) -> Vec<Vec<LlmMessage>> {
        self.call_log.read().await.clone()
    }
}

#[async_trait]
impl LlmDriver for ScriptedDriver {
    async fn chat_completion(
        &self,
        messages: Vec<LlmMessage>,
        _config: &LlmCallConfig,
    ) -> Result<LlmResponse> {
        let calls = {
            let mut log = self.call_log.write().await;
            log.push(messages);
            log.len()
        };

        if let Some(message) = &self.failure {
            return Err(EngineError::backend("RateLimitError", message.clone()));
        }

        let text = self
            .replies
            .write()
            .await
            .pop_front()
            .unwrap_or_else(|| format!("Follow-up question {calls}"));

        Ok(LlmResponse {
            usage: None,
            raw: json!({"text": text}),
            text,
        })
    }
}

// ============================================================================
// MockToolExecutor - function tools
// ============================================================================

/// Tool executor returning fixture outputs keyed by function name.
///
/// Functions without a fixture get `{"status": "ok", "tool": <name>}`.
#[derive(Debug, Default)]
pub struct MockToolExecutor {
    results: Arc<RwLock<BTreeMap<String, Value>>>,
    call_log: Arc<RwLock<Vec<ToolCall>>>,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fixtures(fixtures: BTreeMap<String, Value>) -> Self {
        Self {
            results: Arc::new(RwLock::new(fixtures)),
            call_log: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Set the output for a specific function
    pub async fn set_result(&self, tool_name: impl Into<String>, result: Value) {
        self.results.write().await.insert(tool_name.into(), result);
    }

    /// Get the call log
    pub async fn calls(&self) -> Vec<ToolCall> {
        self.call_log.read().await.clone()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(&self, call: &ToolCall) -> Result<Value> {
        self.call_log.write().await.push(call.clone());

        Ok(self
            .results
            .read()
            .await
            .get(&call.name)
            .cloned()
            .unwrap_or_else(|| json!({"status": "ok", "tool": call.name})))
    }
}

/// Tool executor that always fails
#[derive(Debug, Clone)]
pub struct FailingToolExecutor {
    error_message: String,
}

impl FailingToolExecutor {
    pub fn new(error_message: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
        }
    }
}

impl Default for FailingToolExecutor {
    fn default() -> Self {
        Self::new("Tool execution failed")
    }
}

#[async_trait]
impl ToolExecutor for FailingToolExecutor {
    async fn execute(&self, _call: &ToolCall) -> Result<Value> {
        Err(EngineError::tool(self.error_message.clone()))
    }
}
