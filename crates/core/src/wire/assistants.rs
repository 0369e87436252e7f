// Thread/run wire types
//
// Messages, runs and run steps of the thread/run polling protocol. A single
// assistant turn is recorded as an `AssistantTurnPayload` bundle: the run, the
// messages it produced and the run steps fetched after completion.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::chat::ChatToolCall;
use super::responses::FileSearchHit;
use super::{lenient, RawArguments, WireUsage};

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadMessage {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub role: String,
    /// Typed blocks; a bare string is accepted as one text block
    #[serde(default, deserialize_with = "content_blocks")]
    pub content: Vec<ThreadContent>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub created_at: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub run_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub thread_id: Option<String>,
}

impl ThreadMessage {
    /// Text blocks joined with newlines, in block order
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ThreadContent::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_user(&self) -> bool {
        self.role == "user"
    }

    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreadContent {
    Text {
        #[serde(default, deserialize_with = "lenient::or_default")]
        text: ThreadText,
    },
    #[serde(other)]
    Unknown,
}

impl ThreadContent {
    fn text(&self) -> Option<&str> {
        match self {
            ThreadContent::Text { text } => Some(text.value()),
            ThreadContent::Unknown => None,
        }
    }
}

/// The `text` of a text block: normally `{value, annotations}`, sometimes a
/// plain string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ThreadText {
    Plain(String),
    Block {
        #[serde(default, deserialize_with = "lenient::string")]
        value: String,
    },
}

impl Default for ThreadText {
    fn default() -> Self {
        ThreadText::Plain(String::new())
    }
}

impl ThreadText {
    pub fn value(&self) -> &str {
        match self {
            ThreadText::Plain(value) | ThreadText::Block { value } => value,
        }
    }
}

fn content_blocks<'de, D>(deserializer: D) -> Result<Vec<ThreadContent>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(text) => vec![ThreadContent::Text {
            text: ThreadText::Plain(text),
        }],
        other => lenient::items_from_value(other),
    })
}

// ============================================================================
// Runs
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadRunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ThreadRunStatus {
    /// Statuses after which the run will never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ThreadRunStatus::Completed
                | ThreadRunStatus::Failed
                | ThreadRunStatus::Cancelled
                | ThreadRunStatus::Expired
                | ThreadRunStatus::Incomplete
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadRunStatus::Queued => "queued",
            ThreadRunStatus::InProgress => "in_progress",
            ThreadRunStatus::RequiresAction => "requires_action",
            ThreadRunStatus::Cancelling => "cancelling",
            ThreadRunStatus::Cancelled => "cancelled",
            ThreadRunStatus::Failed => "failed",
            ThreadRunStatus::Completed => "completed",
            ThreadRunStatus::Incomplete => "incomplete",
            ThreadRunStatus::Expired => "expired",
            ThreadRunStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ThreadRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadRun {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub thread_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub status: ThreadRunStatus,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub required_action: Option<RequiredAction>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub last_error: Option<RunError>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub usage: Option<WireUsage>,
}

impl ThreadRun {
    /// Tool calls the run is waiting on (empty unless `requires_action`)
    pub fn pending_tool_calls(&self) -> &[ChatToolCall] {
        match (&self.status, &self.required_action) {
            (ThreadRunStatus::RequiresAction, Some(action)) => {
                &action.submit_tool_outputs.tool_calls
            }
            _ => &[],
        }
    }

    pub fn error_message(&self) -> String {
        self.last_error
            .as_ref()
            .map(|e| e.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("run ended with status {}", self.status))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequiredAction {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub submit_tool_outputs: SubmitToolOutputs,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitToolOutputs {
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
    pub tool_calls: Vec<ChatToolCall>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunError {
    #[serde(default, deserialize_with = "lenient::string")]
    pub code: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub message: String,
}

// ============================================================================
// Run steps
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunStep {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub run_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub step_details: StepDetails,
}

impl RunStep {
    pub fn tool_calls(&self) -> &[StepToolCall] {
        match &self.step_details {
            StepDetails::ToolCalls { tool_calls } => tool_calls,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepDetails {
    ToolCalls {
        #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
        tool_calls: Vec<StepToolCall>,
    },
    MessageCreation,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepToolCall {
    FileSearch {
        #[serde(default, deserialize_with = "lenient::or_default")]
        file_search: StepFileSearch,
    },
    CodeInterpreter {
        #[serde(default, deserialize_with = "lenient::or_default")]
        code_interpreter: StepCodeInterpreter,
    },
    Function {
        #[serde(default, deserialize_with = "lenient::string")]
        id: String,
        #[serde(default, deserialize_with = "lenient::or_default")]
        function: StepFunction,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepFileSearch {
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
    pub results: Vec<FileSearchHit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepCodeInterpreter {
    #[serde(default, deserialize_with = "lenient::string")]
    pub input: String,
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
    pub outputs: Vec<StepCodeOutput>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepCodeOutput {
    Logs {
        #[serde(default, deserialize_with = "lenient::string")]
        logs: String,
    },
    Image {
        #[serde(default, deserialize_with = "lenient::or_default")]
        image: StepImage,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepImage {
    #[serde(default, deserialize_with = "lenient::string")]
    pub file_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepFunction {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default)]
    pub arguments: RawArguments,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub output: Option<String>,
}

// ============================================================================
// Requests
// ============================================================================

/// Identifier-only view of a created thread, message or run
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectRef {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateMessageRequest {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateRunRequest {
    pub assistant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitToolOutputsRequest {
    pub tool_outputs: Vec<ToolOutput>,
}

// ============================================================================
// Bundles
// ============================================================================

/// Paginated list wrapper returned by list endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
pub struct ListPage<T> {
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
    pub data: Vec<T>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub has_more: bool,
}

impl<T> Default for ListPage<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            has_more: false,
        }
    }
}

/// Raw record of one assistant turn on the thread/run backend
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantTurnPayload {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub thread_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub run: ThreadRun,
    /// Messages created by the run
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
    pub messages: Vec<ThreadMessage>,
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
    pub run_steps: Vec<RunStep>,
}

/// A whole thread as fed to conversation normalization
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadTranscript {
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
    pub messages: Vec<ThreadMessage>,
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
    pub run_steps: Vec<RunStep>,
}
