// Response normalizers
//
// One normalizer per backend payload shape. All of them read raw payloads
// through the typed `wire` structs and emit the canonical model; none of them
// ever fail.

mod assistants;
mod chat;
mod messages;
mod responses;

pub use assistants::AssistantsNormalizer;
pub use chat::ChatNormalizer;
pub use messages::MessagesNormalizer;
pub use responses::ResponsesNormalizer;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::borrow::Cow;
use std::collections::HashSet;
use tracing::warn;

use crate::normalized::{
    Citation, CodeInterpreterResult, FileSearchResult, MessageMetadata, NormalizedConversation,
    NormalizedMessage, NormalizedResponse, ToolUsage, WebSearchResult,
};
use crate::tool_types::ToolCall;

/// Payload shape a normalizer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizerKind {
    /// Stateless chat completions
    Chat,
    /// Response chaining (`output` items)
    Responses,
    /// Thread/run polling
    Assistants,
    /// Alternate-provider messages format
    Messages,
}

impl std::fmt::Display for NormalizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizerKind::Chat => write!(f, "chat"),
            NormalizerKind::Responses => write!(f, "responses"),
            NormalizerKind::Assistants => write!(f, "assistants"),
            NormalizerKind::Messages => write!(f, "messages"),
        }
    }
}

/// Translates one backend's raw payloads into the canonical model
pub trait ResponseNormalizer: Send + Sync {
    /// Payload shape handled by this normalizer
    fn kind(&self) -> NormalizerKind;

    /// Normalize the raw payload of a single backend turn
    fn normalize_single_response(&self, raw: &Value) -> NormalizedResponse;

    /// Normalize a stored conversation (see each implementation for the
    /// accepted input shape)
    fn normalize_conversation(&self, raw: &Value) -> NormalizedConversation;
}

/// Normalizer for a payload shape
pub fn normalizer_for(kind: NormalizerKind) -> &'static dyn ResponseNormalizer {
    match kind {
        NormalizerKind::Chat => &ChatNormalizer,
        NormalizerKind::Responses => &ResponsesNormalizer,
        NormalizerKind::Assistants => &AssistantsNormalizer,
        NormalizerKind::Messages => &MessagesNormalizer,
    }
}

/// Accept either `{"messages": [...]}` or a bare message array
pub(crate) fn transcript_input(raw: &Value) -> Cow<'_, Value> {
    match raw {
        Value::Array(_) => Cow::Owned(json!({ "messages": raw })),
        other => Cow::Borrowed(other),
    }
}

/// Enforce unique tool-call ids within one response.
///
/// Empty ids are replaced with `call_{n}` (1-based position); later duplicates
/// of an id are dropped.
pub(crate) fn dedupe_tool_calls(calls: Vec<ToolCall>) -> Vec<ToolCall> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(calls.len());
    for (index, mut call) in calls.into_iter().enumerate() {
        if call.id.is_empty() {
            call.id = format!("call_{}", index + 1);
        }
        if seen.insert(call.id.clone()) {
            unique.push(call);
        } else {
            warn!(tool_call_id = %call.id, tool_name = %call.name, "Dropping duplicate tool call id");
        }
    }
    unique
}

/// Attach text citations to the web searches of one response.
///
/// Sources and citations stay separate lists. Citations with no search call to
/// attach to produce one result without a query.
pub(crate) fn attach_citations(
    mut searches: Vec<WebSearchResult>,
    citations: Vec<Citation>,
) -> Vec<WebSearchResult> {
    if citations.is_empty() {
        return searches;
    }
    if searches.is_empty() {
        searches.push(WebSearchResult {
            query: None,
            sources: Vec::new(),
            citations,
        });
        return searches;
    }
    for search in &mut searches {
        search.citations.extend(citations.iter().cloned());
    }
    searches
}

/// Joins non-empty text fragments with newlines
pub(crate) fn join_text<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Conversation builder
// ============================================================================

/// Assembles a normalized transcript while enforcing turn numbering.
///
/// Each user message opens a new turn. Consecutive assistant messages in one
/// turn are merged so that every turn ends with exactly one assistant message.
#[derive(Debug, Default)]
pub(crate) struct ConversationBuilder {
    messages: Vec<NormalizedMessage>,
    turn: u32,
    file_search_results: Vec<FileSearchResult>,
    web_search_results: Vec<WebSearchResult>,
    code_interpreter_results: Vec<CodeInterpreterResult>,
}

impl ConversationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turn += 1;
        self.messages.push(NormalizedMessage::user(content, self.turn));
    }

    pub fn push_assistant(
        &mut self,
        response: NormalizedResponse,
        metadata: Option<MessageMetadata>,
    ) {
        self.web_search_results
            .extend(response.web_search_results.iter().cloned());
        self.code_interpreter_results
            .extend(response.code_interpreter_results.iter().cloned());
        self.file_search_results
            .extend(response.file_search_results.iter().cloned());

        if self.turn == 0 {
            warn!("Assistant message precedes any user message, dropping it");
            return;
        }

        let mut message = NormalizedMessage::from_response(&response, self.turn);
        message.metadata = metadata;

        match self.messages.last_mut() {
            Some(last) if last.is_assistant() && last.turn == self.turn => {
                merge_assistant(last, message);
            }
            _ => self.messages.push(message),
        }
    }

    /// Record typed results that are not tied to a particular message
    pub fn push_results(
        &mut self,
        file_search: Vec<FileSearchResult>,
        web_search: Vec<WebSearchResult>,
        code_interpreter: Vec<CodeInterpreterResult>,
    ) {
        self.file_search_results.extend(file_search);
        self.web_search_results.extend(web_search);
        self.code_interpreter_results.extend(code_interpreter);
    }

    pub fn finish(self) -> NormalizedConversation {
        let tool_usage = ToolUsage::from_messages(&self.messages);
        NormalizedConversation {
            messages: self.messages,
            tool_usage,
            file_search_results: self.file_search_results,
            web_search_results: self.web_search_results,
            code_interpreter_results: self.code_interpreter_results,
        }
    }
}

fn merge_assistant(into: &mut NormalizedMessage, next: NormalizedMessage) {
    into.content = join_text([into.content.as_str(), next.content.as_str()]);
    let mut calls = std::mem::take(&mut into.tool_calls);
    calls.extend(next.tool_calls);
    into.tool_calls = dedupe_tool_calls(calls);
    into.usage = match (into.usage, next.usage) {
        (Some(a), Some(b)) => Some(a + b),
        (a, b) => a.or(b),
    };
    if next.metadata.is_some() {
        into.metadata = next.metadata;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalized::UsageTotals;
    use serde_json::Map;

    #[test]
    fn test_dedupe_assigns_missing_ids_and_drops_duplicates() {
        let calls = vec![
            ToolCall::function("", "a", Map::new()),
            ToolCall::function("x", "b", Map::new()),
            ToolCall::function("x", "c", Map::new()),
        ];
        let unique = dedupe_tool_calls(calls);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].id, "call_1");
        assert_eq!(unique[1].name, "b");
    }

    #[test]
    fn test_builder_merges_consecutive_assistant_messages() {
        let mut builder = ConversationBuilder::new();
        builder.push_user("hi");
        let mut first = NormalizedResponse::text("one");
        first.usage = Some(UsageTotals::new(1, 1, 2));
        builder.push_assistant(first, None);
        let mut second = NormalizedResponse::text("two");
        second.usage = Some(UsageTotals::new(2, 2, 4));
        builder.push_assistant(second, None);

        let conversation = builder.finish();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[1].content, "one\ntwo");
        assert_eq!(conversation.messages[1].usage, Some(UsageTotals::new(3, 3, 6)));
    }

    #[test]
    fn test_builder_drops_leading_assistant_message() {
        let mut builder = ConversationBuilder::new();
        builder.push_assistant(NormalizedResponse::text("welcome"), None);
        builder.push_user("hi");
        let conversation = builder.finish();
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].turn, 1);
    }

    #[test]
    fn test_citations_without_search_call() {
        let citation = Citation {
            title: None,
            url: "https://example.com".to_string(),
            start_index: None,
            end_index: None,
        };
        let results = attach_citations(Vec::new(), vec![citation]);
        assert_eq!(results.len(), 1);
        assert!(results[0].query.is_none());
        assert!(results[0].sources.is_empty());
    }

    #[test]
    fn test_normalizer_for_reports_kind() {
        for kind in [
            NormalizerKind::Chat,
            NormalizerKind::Responses,
            NormalizerKind::Assistants,
            NormalizerKind::Messages,
        ] {
            assert_eq!(normalizer_for(kind).kind(), kind);
        }
    }
}
