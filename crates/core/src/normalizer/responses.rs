// Response-chaining normalizer

use serde_json::Value;

use super::{
    attach_citations, dedupe_tool_calls, transcript_input, ConversationBuilder, NormalizerKind,
    ResponseNormalizer,
};
use crate::language::detect_language;
use crate::normalized::{
    Citation, CodeInterpreterResult, CodeOutput, FileSearchResult, MessageMetadata,
    NormalizedConversation, NormalizedResponse, ResponseMetadata, WebSearchResult, WebSource,
};
use crate::state::ContinuationToken;
use crate::wire::responses::{
    Annotation, CodeInterpreterOutput, OutputContent, OutputItem, ResponseObject,
    ResponsesTranscript, TranscriptEntry,
};
use crate::wire::{parse_lenient, text_from_value, WireUsage};

/// Normalizer for `output` item arrays.
///
/// Conversations are `{"messages": [...]}` where each entry is either a user
/// input (`{"role": "user", "content": ...}`) or a full response object.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponsesNormalizer;

impl ResponsesNormalizer {
    /// Normalize an already-parsed response object
    pub fn normalize_object(response: &ResponseObject) -> NormalizedResponse {
        let mut texts = Vec::new();
        let mut citations = Vec::new();
        let mut tool_calls = Vec::new();
        let mut web_searches = Vec::new();
        let mut code_results = Vec::new();
        let mut file_results = Vec::new();

        for item in &response.output {
            match item {
                OutputItem::Message { content } => {
                    for part in content {
                        if let OutputContent::OutputText { text, annotations } = part {
                            texts.push(text.as_str());
                            citations.extend(annotations.iter().filter_map(url_citation));
                        }
                    }
                }
                OutputItem::FunctionCall { .. } => tool_calls.extend(item.as_tool_call()),
                OutputItem::FileSearchCall { queries, results } => {
                    file_results.extend(results.iter().map(|hit| FileSearchResult {
                        queries: queries.clone(),
                        file_id: hit.file_id.clone(),
                        filename: hit.filename.clone(),
                        score: hit.score,
                        text: hit.text(),
                    }));
                }
                OutputItem::WebSearchCall { action } => {
                    let action = action.clone().unwrap_or_default();
                    web_searches.push(WebSearchResult {
                        query: action.query,
                        sources: action
                            .sources
                            .into_iter()
                            .map(|s| WebSource {
                                title: s.title,
                                url: s.url,
                            })
                            .collect(),
                        citations: Vec::new(),
                    });
                }
                OutputItem::CodeInterpreterCall { code, outputs } => {
                    code_results.push(CodeInterpreterResult {
                        code: code.clone(),
                        language: detect_language(code),
                        outputs: outputs.iter().filter_map(code_output).collect(),
                    });
                }
                OutputItem::Unknown => {}
            }
        }

        NormalizedResponse {
            text: texts.join("\n"),
            tool_calls: dedupe_tool_calls(tool_calls),
            usage: response.usage.as_ref().map(WireUsage::totals),
            web_search_results: attach_citations(web_searches, citations),
            code_interpreter_results: code_results,
            file_search_results: file_results,
            metadata: ResponseMetadata {
                response_id: response.id.clone(),
                model: response.model.clone(),
                finish_reason: response.status.clone(),
                ..Default::default()
            },
        }
    }
}

fn url_citation(annotation: &Annotation) -> Option<Citation> {
    match annotation {
        Annotation::UrlCitation {
            url,
            title,
            start_index,
            end_index,
        } => Some(Citation {
            title: title.clone(),
            url: url.clone(),
            start_index: *start_index,
            end_index: *end_index,
        }),
        _ => None,
    }
}

fn code_output(output: &CodeInterpreterOutput) -> Option<CodeOutput> {
    match output {
        CodeInterpreterOutput::Logs { logs } => Some(CodeOutput::Logs { logs: logs.clone() }),
        CodeInterpreterOutput::Image { url } => Some(CodeOutput::Image {
            reference: url.clone(),
        }),
        CodeInterpreterOutput::Unknown => None,
    }
}

impl ResponseNormalizer for ResponsesNormalizer {
    fn kind(&self) -> NormalizerKind {
        NormalizerKind::Responses
    }

    fn normalize_single_response(&self, raw: &Value) -> NormalizedResponse {
        Self::normalize_object(&parse_lenient(raw))
    }

    fn normalize_conversation(&self, raw: &Value) -> NormalizedConversation {
        let transcript: ResponsesTranscript = parse_lenient(&transcript_input(raw));
        let mut builder = ConversationBuilder::new();

        for item in &transcript.messages {
            let entry: TranscriptEntry = parse_lenient(item);
            if entry.is_response() {
                let response = Self::normalize_object(&parse_lenient(item));
                let metadata = response.metadata.response_id.clone().map(|id| MessageMetadata {
                    continuation: ContinuationToken::Response {
                        response_id: id.clone(),
                    },
                    response_id: Some(id),
                    run_id: None,
                });
                builder.push_assistant(response, metadata);
                continue;
            }
            match entry.role.as_str() {
                "user" => builder.push_user(text_from_value(&entry.content)),
                "assistant" => builder
                    .push_assistant(NormalizedResponse::text(text_from_value(&entry.content)), None),
                _ => {}
            }
        }

        builder.finish()
    }
}
