// Thread/run normalizer
//
// Turn numbers are not supplied by this backend; they are derived by counting
// preceding user messages. File-search detail lives on run steps, not on the
// messages themselves.

use serde_json::Value;
use std::collections::HashSet;

use super::{dedupe_tool_calls, transcript_input, ConversationBuilder, NormalizerKind};
use super::ResponseNormalizer;
use crate::language::detect_language;
use crate::normalized::{
    CodeInterpreterResult, CodeOutput, FileSearchResult, MessageMetadata,
    NormalizedConversation, NormalizedResponse, ResponseMetadata,
};
use crate::state::ContinuationToken;
use crate::tool_types::ToolCall;
use crate::wire::assistants::{
    AssistantTurnPayload, RunStep, StepCodeOutput, StepToolCall, ThreadMessage, ThreadTranscript,
};
use crate::wire::{parse_lenient, WireUsage};

/// Normalizer for thread messages, runs and run steps.
///
/// Single responses are `AssistantTurnPayload` bundles. Conversations are
/// `{"messages": [thread messages], "run_steps": [run steps]}`, with messages
/// in either order (they are sorted by `created_at` when every message has
/// one).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssistantsNormalizer;

/// Typed results recovered from run steps
#[derive(Debug, Default)]
struct StepResults {
    tool_calls: Vec<ToolCall>,
    file_search: Vec<FileSearchResult>,
    code_interpreter: Vec<CodeInterpreterResult>,
}

fn step_results<'a>(steps: impl IntoIterator<Item = &'a RunStep>) -> StepResults {
    let mut results = StepResults::default();
    for step in steps {
        for call in step.tool_calls() {
            match call {
                StepToolCall::FileSearch { file_search } => {
                    results
                        .file_search
                        .extend(file_search.results.iter().map(|hit| FileSearchResult {
                            queries: Vec::new(),
                            file_id: hit.file_id.clone(),
                            filename: hit.filename.clone(),
                            score: hit.score,
                            text: hit.text(),
                        }));
                }
                StepToolCall::CodeInterpreter { code_interpreter } => {
                    results.code_interpreter.push(CodeInterpreterResult {
                        code: code_interpreter.input.clone(),
                        language: detect_language(&code_interpreter.input),
                        outputs: code_interpreter
                            .outputs
                            .iter()
                            .filter_map(|output| match output {
                                StepCodeOutput::Logs { logs } => {
                                    Some(CodeOutput::Logs { logs: logs.clone() })
                                }
                                StepCodeOutput::Image { image } => Some(CodeOutput::Image {
                                    reference: image.file_id.clone(),
                                }),
                                StepCodeOutput::Unknown => None,
                            })
                            .collect(),
                    });
                }
                StepToolCall::Function { id, function } => {
                    results.tool_calls.push(ToolCall::function(
                        id.clone(),
                        function.name.clone(),
                        function.arguments.to_map(&function.name),
                    ));
                }
                StepToolCall::Unknown => {}
            }
        }
    }
    results
}

/// Oldest-first ordering when every message carries a timestamp.
///
/// Timestamps have one-second resolution. Newest-first input is reversed
/// before the stable sort so same-second messages keep conversational order,
/// and a user message sorts ahead of an assistant message from the same second.
fn chronological(mut messages: Vec<ThreadMessage>) -> Vec<ThreadMessage> {
    if !messages.iter().all(|m| m.created_at.is_some()) {
        return messages;
    }
    if messages.windows(2).any(|pair| pair[0].created_at > pair[1].created_at) {
        messages.reverse();
    }
    messages.sort_by_key(|m| (m.created_at.unwrap_or_default(), m.is_assistant()));
    messages
}

impl ResponseNormalizer for AssistantsNormalizer {
    fn kind(&self) -> NormalizerKind {
        NormalizerKind::Assistants
    }

    fn normalize_single_response(&self, raw: &Value) -> NormalizedResponse {
        let payload: AssistantTurnPayload = parse_lenient(raw);
        let messages = chronological(payload.messages);
        let steps = step_results(&payload.run_steps);

        let text = messages
            .iter()
            .filter(|m| m.is_assistant())
            .map(ThreadMessage::text)
            .collect::<Vec<_>>()
            .join("\n");

        let run_id = (!payload.run.id.is_empty()).then(|| payload.run.id.clone());
        NormalizedResponse {
            text,
            tool_calls: dedupe_tool_calls(steps.tool_calls),
            usage: payload.run.usage.as_ref().map(WireUsage::totals),
            web_search_results: Vec::new(),
            code_interpreter_results: steps.code_interpreter,
            file_search_results: steps.file_search,
            metadata: ResponseMetadata {
                response_id: run_id.clone(),
                finish_reason: Some(payload.run.status.to_string()),
                thread_id: payload
                    .thread_id
                    .or_else(|| payload.run.thread_id.clone()),
                run_id,
                ..Default::default()
            },
        }
    }

    fn normalize_conversation(&self, raw: &Value) -> NormalizedConversation {
        let transcript: ThreadTranscript = parse_lenient(&transcript_input(raw));
        let messages = chronological(transcript.messages);
        let mut builder = ConversationBuilder::new();
        let mut runs_seen = HashSet::new();

        for message in &messages {
            if message.is_user() {
                builder.push_user(message.text());
                continue;
            }
            if !message.is_assistant() {
                continue;
            }

            let mut response = NormalizedResponse::text(message.text());
            // Function calls of a run belong to the first message it produced
            if let Some(run_id) = &message.run_id {
                if runs_seen.insert(run_id.clone()) {
                    let run_steps = transcript
                        .run_steps
                        .iter()
                        .filter(|s| s.run_id.as_deref() == Some(run_id.as_str()));
                    response.tool_calls = dedupe_tool_calls(step_results(run_steps).tool_calls);
                }
            }

            let metadata = message.thread_id.clone().map(|thread_id| MessageMetadata {
                continuation: ContinuationToken::Thread {
                    thread_id,
                    run_id: message.run_id.clone(),
                },
                response_id: None,
                run_id: message.run_id.clone(),
            });
            builder.push_assistant(response, metadata);
        }

        let steps = step_results(&transcript.run_steps);
        builder.push_results(steps.file_search, Vec::new(), steps.code_interpreter);
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalized::UsageTotals;
    use serde_json::json;

    fn text_block(value: &str) -> Value {
        json!({"type": "text", "text": {"value": value, "annotations": []}})
    }

    #[test]
    fn test_single_turn_payload() {
        let raw = json!({
            "thread_id": "thread_1",
            "run": {"id": "run_1", "status": "completed",
                    "usage": {"prompt_tokens": 7, "completion_tokens": 3, "total_tokens": 10}},
            "messages": [{"id": "msg_2", "role": "assistant",
                          "content": [text_block("part one"), text_block("part two")]}],
            "run_steps": [{"id": "step_1", "run_id": "run_1", "step_details": {
                "type": "tool_calls",
                "tool_calls": [{"id": "fs_1", "type": "file_search", "file_search": {"results": [
                    {"file_id": "file_9", "file_name": "faq.md", "score": 0.5,
                     "content": [{"type": "text", "text": "Shipping takes 3 days"}]}
                ]}}]
            }}]
        });

        let response = AssistantsNormalizer.normalize_single_response(&raw);
        assert_eq!(response.text, "part one\npart two");
        assert_eq!(response.usage, Some(UsageTotals::new(7, 3, 10)));
        assert_eq!(response.file_search_results.len(), 1);
        assert_eq!(response.file_search_results[0].filename.as_deref(), Some("faq.md"));
        assert_eq!(response.metadata.thread_id.as_deref(), Some("thread_1"));
        assert_eq!(response.metadata.run_id.as_deref(), Some("run_1"));
    }

    #[test]
    fn test_conversation_computes_turns_from_user_messages() {
        // Newest first, as the list endpoint returns by default
        let raw = json!({
            "messages": [
                {"id": "m4", "role": "assistant", "created_at": 4, "thread_id": "t", "run_id": "run_2",
                 "content": [text_block("Anytime")]},
                {"id": "m3", "role": "user", "created_at": 3, "content": [text_block("Thanks")]},
                {"id": "m2", "role": "assistant", "created_at": 2, "thread_id": "t", "run_id": "run_1",
                 "content": [text_block("Order 7 shipped")]},
                {"id": "m1", "role": "user", "created_at": 1, "content": [text_block("Where is order 7?")]}
            ],
            "run_steps": [{"id": "s1", "run_id": "run_1", "step_details": {"type": "tool_calls", "tool_calls": [
                {"id": "call_1", "type": "function",
                 "function": {"name": "lookup", "arguments": "{\"order\": 7}", "output": "shipped"}},
                {"id": "ci_1", "type": "code_interpreter", "code_interpreter": {
                    "input": "const x = 1", "outputs": [{"type": "logs", "logs": "1"}]}}
            ]}}]
        });

        let conversation = AssistantsNormalizer.normalize_conversation(&raw);
        let turns: Vec<u32> = conversation.messages.iter().map(|m| m.turn).collect();
        assert_eq!(turns, vec![1, 1, 2, 2]);
        assert_eq!(conversation.messages[0].content, "Where is order 7?");
        assert_eq!(conversation.messages[1].tool_calls[0].name, "lookup");
        assert!(conversation.messages[3].tool_calls.is_empty());
        assert_eq!(conversation.tool_usage.total(), 1);
        assert_eq!(conversation.code_interpreter_results.len(), 1);

        let metadata = conversation.messages[1].metadata.as_ref().unwrap();
        assert_eq!(metadata.continuation.thread_id(), Some("t"));
    }

    #[test]
    fn test_same_second_reply_follows_its_user_message() {
        let raw = json!({
            "messages": [
                {"id": "m2", "role": "assistant", "created_at": 5, "run_id": "run_1",
                 "content": [text_block("Order 7 shipped")]},
                {"id": "m1", "role": "user", "created_at": 5, "content": [text_block("Where is order 7?")]}
            ]
        });

        let conversation = AssistantsNormalizer.normalize_conversation(&raw);
        let roles: Vec<(String, u32)> = conversation
            .messages
            .iter()
            .map(|m| (m.role.to_string(), m.turn))
            .collect();
        assert_eq!(
            roles,
            vec![("user".to_string(), 1), ("assistant".to_string(), 1)]
        );
        assert_eq!(conversation.messages[1].content, "Order 7 shipped");
    }

    #[test]
    fn test_newest_first_ties_keep_conversation_order() {
        let raw = json!({
            "messages": [
                {"id": "m4", "role": "assistant", "created_at": 9, "content": [text_block("Anytime")]},
                {"id": "m3", "role": "user", "created_at": 9, "content": [text_block("Thanks")]},
                {"id": "m2", "role": "assistant", "created_at": 4, "content": [text_block("Shipped")]},
                {"id": "m1", "role": "user", "created_at": 4, "content": [text_block("Status?")]}
            ]
        });

        let conversation = AssistantsNormalizer.normalize_conversation(&raw);
        let contents: Vec<&str> = conversation.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Status?", "Shipped", "Thanks", "Anytime"]);
        let turns: Vec<u32> = conversation.messages.iter().map(|m| m.turn).collect();
        assert_eq!(turns, vec![1, 1, 2, 2]);
    }

    #[test]
    fn test_missing_fields_degrade() {
        let response = AssistantsNormalizer.normalize_single_response(&json!({"run": 5}));
        assert_eq!(response.text, "");
        assert!(response.usage.is_none());
        assert!(response.metadata.run_id.is_none());
    }
}
