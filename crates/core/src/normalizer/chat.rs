// Chat completions normalizer

use serde_json::Value;
use tracing::debug;

use super::{dedupe_tool_calls, transcript_input, ConversationBuilder, NormalizerKind};
use super::ResponseNormalizer;
use crate::normalized::{NormalizedConversation, NormalizedResponse, ResponseMetadata};
use crate::wire::chat::{ChatCompletion, ChatMessage};
use crate::wire::{lenient, parse_lenient, WireUsage};

/// Normalizer for `choices[0].message` payloads.
///
/// Conversations are `{"messages": [chat messages]}`; system and tool
/// messages are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatNormalizer;

#[derive(Debug, Default, serde::Deserialize)]
struct ChatTranscript {
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
    messages: Vec<ChatMessage>,
}

impl ChatNormalizer {
    fn normalize_message(message: &ChatMessage, usage: Option<&WireUsage>) -> NormalizedResponse {
        NormalizedResponse {
            text: message.text(),
            tool_calls: dedupe_tool_calls(
                message.tool_calls.iter().map(|c| c.to_tool_call()).collect(),
            ),
            usage: usage.map(WireUsage::totals),
            ..Default::default()
        }
    }
}

impl ResponseNormalizer for ChatNormalizer {
    fn kind(&self) -> NormalizerKind {
        NormalizerKind::Chat
    }

    fn normalize_single_response(&self, raw: &Value) -> NormalizedResponse {
        let completion: ChatCompletion = parse_lenient(raw);
        let Some(message) = completion.first_message() else {
            debug!(response_id = ?completion.id, "Chat completion has no choices");
            return NormalizedResponse {
                usage: completion.usage.as_ref().map(WireUsage::totals),
                metadata: ResponseMetadata {
                    response_id: completion.id.clone(),
                    model: completion.model.clone(),
                    ..Default::default()
                },
                ..Default::default()
            };
        };

        let mut response = Self::normalize_message(message, completion.usage.as_ref());
        response.metadata = ResponseMetadata {
            response_id: completion.id.clone(),
            model: completion.model.clone(),
            finish_reason: completion.finish_reason().map(str::to_string),
            ..Default::default()
        };
        response
    }

    fn normalize_conversation(&self, raw: &Value) -> NormalizedConversation {
        let transcript: ChatTranscript = parse_lenient(&transcript_input(raw));
        let mut builder = ConversationBuilder::new();

        for message in &transcript.messages {
            match message.role.as_str() {
                "user" => builder.push_user(message.text()),
                "assistant" => builder.push_assistant(
                    Self::normalize_message(message, message.usage.as_ref()),
                    None,
                ),
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
    fn test_single_response_text_and_tool_calls() {
        let raw = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Checking",
                    "tool_calls": [
                        {"id": "call_1", "type": "function",
                         "function": {"name": "lookup", "arguments": "{\"order\": 1}"}},
                        {"id": "call_2", "type": "function",
                         "function": {"name": "lookup", "arguments": "not json"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        });

        let response = ChatNormalizer.normalize_single_response(&raw);
        assert_eq!(response.text, "Checking");
        assert_eq!(response.tool_calls.len(), 2);
        assert!(response.tool_calls[1].arguments.is_empty());
        assert_eq!(response.usage, Some(UsageTotals::new(10, 5, 15)));
        assert_eq!(response.metadata.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn test_content_parts_join_with_newline() {
        let raw = json!({"choices": [{"message": {
            "role": "assistant",
            "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}, {"type": "text", "text": "c"}]
        }}]});
        assert_eq!(ChatNormalizer.normalize_single_response(&raw).text, "a\nb\nc");
    }

    #[test]
    fn test_malformed_payload_degrades_to_empty_response() {
        let response = ChatNormalizer.normalize_single_response(&json!({"choices": "nope"}));
        assert_eq!(response.text, "");
        assert!(response.tool_calls.is_empty());
        assert!(response.usage.is_none());

        let response = ChatNormalizer.normalize_single_response(&json!(null));
        assert_eq!(response.text, "");
    }

    #[test]
    fn test_conversation_turns_and_tool_usage() {
        let raw = json!({"messages": [
            {"role": "system", "content": "Be brief"},
            {"role": "user", "content": "Where is my order?"},
            {"role": "assistant", "content": null, "tool_calls": [
                {"id": "call_1", "function": {"name": "lookup", "arguments": "{}"}}
            ]},
            {"role": "tool", "tool_call_id": "call_1", "content": "{\"status\": \"shipped\"}"},
            {"role": "assistant", "content": "It shipped."},
            {"role": "user", "content": "Thanks"},
            {"role": "assistant", "content": "You're welcome."}
        ]});

        let conversation = ChatNormalizer.normalize_conversation(&raw);
        let turns: Vec<u32> = conversation.messages.iter().map(|m| m.turn).collect();
        assert_eq!(turns, vec![1, 1, 2, 2]);
        assert_eq!(conversation.messages[1].content, "It shipped.");
        assert_eq!(conversation.tool_usage.counts["lookup"], 1);
    }

    #[test]
    fn test_conversation_accepts_bare_array() {
        let raw = json!([
            {"role": "user", "content": "Hi"},
            {"role": "assistant", "content": "Hello"}
        ]);
        assert_eq!(ChatNormalizer.normalize_conversation(&raw).messages.len(), 2);
    }
}
