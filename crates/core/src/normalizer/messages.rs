// Messages-API normalizer
//
// This backend has no file-search concept; file-search results are always
// empty. Web search comes from server-side tool blocks.

use serde_json::Value;

use super::{
    attach_citations, dedupe_tool_calls, transcript_input, ConversationBuilder, NormalizerKind,
    ResponseNormalizer,
};
use crate::normalized::{
    Citation, NormalizedConversation, NormalizedResponse, ResponseMetadata, WebSearchResult,
    WebSource,
};
use crate::wire::messages::{ContentBlock, MessagesResponse, MessagesTranscript};
use crate::wire::{parse_lenient, WireUsage};

/// Normalizer for typed content-block arrays (`text` / `tool_use`).
///
/// Conversations are `{"messages": [{"role", "content"}]}`; user messages that
/// only carry tool results continue the current turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagesNormalizer;

impl MessagesNormalizer {
    /// Normalize an already-parsed message
    pub fn normalize_message(message: &MessagesResponse) -> NormalizedResponse {
        let mut searches: Vec<(String, WebSearchResult)> = Vec::new();
        let mut citations = Vec::new();

        for block in &message.content {
            match block {
                ContentBlock::ServerToolUse { id, name, input } if name == "web_search" => {
                    let query = input
                        .as_object()
                        .and_then(|o| o.get("query"))
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    searches.push((
                        id.clone(),
                        WebSearchResult {
                            query,
                            ..Default::default()
                        },
                    ));
                }
                ContentBlock::WebSearchToolResult {
                    tool_use_id,
                    content,
                } => {
                    let sources = content.iter().map(|r| WebSource {
                        title: r.title.clone(),
                        url: r.url.clone(),
                    });
                    match searches.iter_mut().find(|(id, _)| id == tool_use_id) {
                        Some((_, search)) => search.sources.extend(sources),
                        None => searches.push((
                            tool_use_id.clone(),
                            WebSearchResult {
                                query: None,
                                sources: sources.collect(),
                                citations: Vec::new(),
                            },
                        )),
                    }
                }
                ContentBlock::Text {
                    citations: cited, ..
                } => {
                    citations.extend(cited.iter().filter_map(|c| {
                        c.url.clone().map(|url| Citation {
                            title: c.title.clone(),
                            url,
                            start_index: None,
                            end_index: None,
                        })
                    }));
                }
                _ => {}
            }
        }

        NormalizedResponse {
            text: message.text(),
            tool_calls: dedupe_tool_calls(message.tool_calls()),
            usage: message.usage.as_ref().map(WireUsage::totals),
            web_search_results: attach_citations(
                searches.into_iter().map(|(_, s)| s).collect(),
                citations,
            ),
            code_interpreter_results: Vec::new(),
            file_search_results: Vec::new(),
            metadata: ResponseMetadata {
                response_id: message.id.clone(),
                model: message.model.clone(),
                finish_reason: message.stop_reason.clone(),
                ..Default::default()
            },
        }
    }
}

impl ResponseNormalizer for MessagesNormalizer {
    fn kind(&self) -> NormalizerKind {
        NormalizerKind::Messages
    }

    fn normalize_single_response(&self, raw: &Value) -> NormalizedResponse {
        Self::normalize_message(&parse_lenient(raw))
    }

    fn normalize_conversation(&self, raw: &Value) -> NormalizedConversation {
        let transcript: MessagesTranscript = parse_lenient(&transcript_input(raw));
        let mut builder = ConversationBuilder::new();

        for message in &transcript.messages {
            match message.role.as_str() {
                "user" if message.is_tool_result_only() => {}
                "user" => builder.push_user(message.text()),
                "assistant" => builder.push_assistant(Self::normalize_message(message), None),
                _ => {}
            }
        }

        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalized::UsageTotals;
    use serde_json::json;

    #[test]
    fn test_single_message_blocks() {
        let raw = json!({
            "id": "msg_01",
            "model": "claude-sonnet",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Looking it up"},
                {"type": "tool_use", "id": "toolu_1", "name": "lookup", "input": {"order": 7}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 6}
        });

        let response = MessagesNormalizer.normalize_single_response(&raw);
        assert_eq!(response.text, "Looking it up");
        assert_eq!(response.tool_calls[0].id, "toolu_1");
        assert_eq!(response.usage, Some(UsageTotals::new(12, 6, 18)));
        assert!(response.file_search_results.is_empty());
        assert_eq!(response.metadata.finish_reason.as_deref(), Some("tool_use"));
    }

    #[test]
    fn test_web_search_blocks() {
        let raw = json!({
            "role": "assistant",
            "content": [
                {"type": "server_tool_use", "id": "srv_1", "name": "web_search", "input": {"query": "rust"}},
                {"type": "web_search_tool_result", "tool_use_id": "srv_1", "content": [
                    {"type": "web_search_result", "url": "https://rust-lang.org", "title": "Rust"}
                ]},
                {"type": "text", "text": "Rust is a language.", "citations": [
                    {"type": "web_search_result_location", "url": "https://rust-lang.org", "title": "Rust"}
                ]}
            ]
        });

        let response = MessagesNormalizer.normalize_single_response(&raw);
        assert_eq!(response.web_search_results.len(), 1);
        let search = &response.web_search_results[0];
        assert_eq!(search.query.as_deref(), Some("rust"));
        assert_eq!(search.sources.len(), 1);
        assert_eq!(search.citations.len(), 1);
    }

    #[test]
    fn test_conversation_tool_results_continue_turn() {
        let raw = json!({"messages": [
            {"role": "user", "content": "Where is order 7?"},
            {"role": "assistant", "content": [
                {"type": "tool_use", "id": "toolu_1", "name": "lookup", "input": {}}
            ]},
            {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "toolu_1", "content": "shipped"}
            ]},
            {"role": "assistant", "content": [{"type": "text", "text": "It shipped."}]}
        ]});

        let conversation = MessagesNormalizer.normalize_conversation(&raw);
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[1].turn, 1);
        assert_eq!(conversation.messages[1].content, "It shipped.");
        assert_eq!(conversation.messages[1].tool_calls.len(), 1);
    }
}
