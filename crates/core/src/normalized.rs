// Canonical conversation model
//
// Every backend normalizer produces these shapes and every consumer (token
// aggregation, tool-result extraction, scoring) reads only these shapes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

use crate::language::CodeLanguage;
use crate::state::ContinuationToken;
use crate::tool_types::ToolCall;

// ============================================================================
// Usage
// ============================================================================

/// Token usage counters. Missing fields are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl UsageTotals {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl Add for UsageTotals {
    type Output = UsageTotals;

    fn add(self, rhs: Self) -> Self::Output {
        UsageTotals {
            prompt_tokens: self.prompt_tokens.saturating_add(rhs.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(rhs.completion_tokens),
            total_tokens: self.total_tokens.saturating_add(rhs.total_tokens),
        }
    }
}

impl AddAssign for UsageTotals {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for UsageTotals {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(UsageTotals::default(), Add::add)
    }
}

// ============================================================================
// Typed tool results
// ============================================================================

/// A source consulted by a web search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub url: String,
}

/// A citation attached to generated text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_index: Option<u64>,
}

/// One web search performed by the backend.
///
/// `sources` come from the search call itself (present only when requested
/// upstream); `citations` come from annotations on the generated text. The two
/// lists are never merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSearchResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default)]
    pub sources: Vec<WebSource>,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

/// Output of an executed code snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CodeOutput {
    Logs { logs: String },
    Image { reference: String },
}

/// One code-interpreter execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeInterpreterResult {
    pub code: String,
    pub language: CodeLanguage,
    #[serde(default)]
    pub outputs: Vec<CodeOutput>,
}

/// One file-search hit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSearchResult {
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default)]
    pub text: String,
}

// ============================================================================
// Responses and messages
// ============================================================================

/// Backend metadata carried alongside a normalized response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

/// Output of a ResponseNormalizer for one backend turn.
///
/// `text` is never absent: missing content normalizes to the empty string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageTotals>,
    #[serde(default)]
    pub web_search_results: Vec<WebSearchResult>,
    #[serde(default)]
    pub code_interpreter_results: Vec<CodeInterpreterResult>,
    #[serde(default)]
    pub file_search_results: Vec<FileSearchResult>,
    #[serde(default)]
    pub metadata: ResponseMetadata,
}

impl NormalizedResponse {
    /// Create a text-only response
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Message role in a normalized transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Backend-specific metadata on an assistant message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default)]
    pub continuation: ContinuationToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

/// One message of a normalized transcript.
///
/// Every message belongs to exactly one turn (1-based). A turn begins with a
/// user message and, on success, ends with exactly one assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub turn: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageTotals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl NormalizedMessage {
    /// Create a user message
    pub fn user(content: impl Into<String>, turn: u32) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            turn,
            usage: None,
            metadata: None,
        }
    }

    /// Create an assistant message without usage or metadata
    pub fn assistant(content: impl Into<String>, turn: u32) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            turn,
            usage: None,
            metadata: None,
        }
    }

    /// Create an assistant message from a normalized response
    pub fn from_response(response: &NormalizedResponse, turn: u32) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: response.text.clone(),
            tool_calls: response.tool_calls.clone(),
            turn,
            usage: response.usage,
            metadata: None,
        }
    }

    /// Attach backend metadata
    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }
}

// ============================================================================
// Conversations
// ============================================================================

/// A tool call observed in a conversation, tagged with its turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUsageEntry {
    pub turn: u32,
    pub call: ToolCall,
}

/// Summary of tool usage across a conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolUsage {
    /// Every tool call in transcript order
    pub calls: Vec<ToolUsageEntry>,
    /// Number of calls per function name
    pub counts: BTreeMap<String, usize>,
}

impl ToolUsage {
    /// Build the summary from a transcript
    pub fn from_messages(messages: &[NormalizedMessage]) -> Self {
        let mut usage = ToolUsage::default();
        for message in messages.iter().filter(|m| m.is_assistant()) {
            for call in &message.tool_calls {
                *usage.counts.entry(call.name.clone()).or_insert(0) += 1;
                usage.calls.push(ToolUsageEntry {
                    turn: message.turn,
                    call: call.clone(),
                });
            }
        }
        usage
    }

    pub fn total(&self) -> usize {
        self.calls.len()
    }
}

/// Output of `normalize_conversation`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedConversation {
    pub messages: Vec<NormalizedMessage>,
    pub tool_usage: ToolUsage,
    #[serde(default)]
    pub file_search_results: Vec<FileSearchResult>,
    #[serde(default)]
    pub web_search_results: Vec<WebSearchResult>,
    #[serde(default)]
    pub code_interpreter_results: Vec<CodeInterpreterResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_types::ToolCall;
    use serde_json::Map;

    #[test]
    fn test_usage_addition_is_fieldwise() {
        let a = UsageTotals::new(1, 2, 3);
        let b = UsageTotals::new(10, 20, 30);
        assert_eq!(a + b, UsageTotals::new(11, 22, 33));
        assert_eq!(vec![a, b].into_iter().sum::<UsageTotals>(), a + b);
    }

    #[test]
    fn test_usage_deserializes_missing_fields_as_zero() {
        let usage: UsageTotals = serde_json::from_str(r#"{"prompt_tokens": 4}"#).unwrap();
        assert_eq!(usage, UsageTotals::new(4, 0, 0));
    }

    #[test]
    fn test_message_roles_serialize_lowercase() {
        let msg = NormalizedMessage::user("Hello", 1);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["turn"], 1);
    }

    #[test]
    fn test_tool_usage_counts_per_function() {
        let mut first = NormalizedMessage::assistant("", 1);
        first.tool_calls = vec![
            ToolCall::function("a", "lookup", Map::new()),
            ToolCall::function("b", "lookup", Map::new()),
        ];
        let mut second = NormalizedMessage::assistant("done", 2);
        second.tool_calls = vec![ToolCall::function("c", "refund", Map::new())];

        let usage = ToolUsage::from_messages(&[
            NormalizedMessage::user("hi", 1),
            first,
            NormalizedMessage::user("again", 2),
            second,
        ]);

        assert_eq!(usage.total(), 3);
        assert_eq!(usage.counts["lookup"], 2);
        assert_eq!(usage.counts["refund"], 1);
        assert_eq!(usage.calls[2].turn, 2);
    }
}
