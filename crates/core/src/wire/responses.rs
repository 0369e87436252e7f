// Response-chaining wire types
//
// A response carries an `output` array of typed items. Unknown item, content
// and annotation types parse into `Unknown` and are ignored downstream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{lenient, RawArguments, WireUsage};
use crate::tool_types::ToolCall;

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseObject {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
    pub output: Vec<OutputItem>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message {
        #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
        content: Vec<OutputContent>,
    },
    FunctionCall {
        #[serde(default, deserialize_with = "lenient::string")]
        call_id: String,
        #[serde(default, deserialize_with = "lenient::string")]
        name: String,
        #[serde(default)]
        arguments: RawArguments,
    },
    FileSearchCall {
        #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
        queries: Vec<String>,
        #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
        results: Vec<FileSearchHit>,
    },
    WebSearchCall {
        #[serde(default, deserialize_with = "lenient::or_default")]
        action: Option<WebSearchAction>,
    },
    CodeInterpreterCall {
        #[serde(default, deserialize_with = "lenient::string")]
        code: String,
        #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
        outputs: Vec<CodeInterpreterOutput>,
    },
    #[serde(other)]
    Unknown,
}

impl OutputItem {
    /// Tool call for a `function_call` item
    pub fn as_tool_call(&self) -> Option<ToolCall> {
        match self {
            OutputItem::FunctionCall {
                call_id,
                name,
                arguments,
            } => Some(ToolCall::function(
                call_id.clone(),
                name.clone(),
                arguments.to_map(name),
            )),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    OutputText {
        #[serde(default, deserialize_with = "lenient::string")]
        text: String,
        #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
        annotations: Vec<Annotation>,
    },
    Refusal {
        #[serde(default, deserialize_with = "lenient::string")]
        refusal: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    UrlCitation {
        #[serde(default, deserialize_with = "lenient::string")]
        url: String,
        #[serde(default, deserialize_with = "lenient::opt_string")]
        title: Option<String>,
        #[serde(default, deserialize_with = "lenient::or_default")]
        start_index: Option<u64>,
        #[serde(default, deserialize_with = "lenient::or_default")]
        end_index: Option<u64>,
    },
    FileCitation {
        #[serde(default, deserialize_with = "lenient::string")]
        file_id: String,
        #[serde(default, deserialize_with = "lenient::opt_string")]
        filename: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebSearchAction {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub query: Option<String>,
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
    pub sources: Vec<WireWebSource>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireWebSource {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub url: String,
}

/// A file-search hit, shared with thread/run step details
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileSearchHit {
    #[serde(default, deserialize_with = "lenient::string")]
    pub file_id: String,
    #[serde(
        default,
        alias = "file_name",
        deserialize_with = "lenient::opt_string"
    )]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub text: Option<String>,
    /// Step details deliver the hit text as a list of content parts
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
    pub content: Vec<FileSearchHitContent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileSearchHitContent {
    #[serde(default, deserialize_with = "lenient::string")]
    pub text: String,
}

impl FileSearchHit {
    pub fn text(&self) -> String {
        match &self.text {
            Some(text) => text.clone(),
            None => self
                .content
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CodeInterpreterOutput {
    Logs {
        #[serde(default, deserialize_with = "lenient::string")]
        logs: String,
    },
    Image {
        #[serde(default, deserialize_with = "lenient::string")]
        url: String,
    },
    #[serde(other)]
    Unknown,
}

/// History fed to conversation normalization: user inputs interleaved with
/// response objects
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponsesTranscript {
    /// Kept raw: response entries are re-read as `ResponseObject`
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
    pub messages: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    pub role: String,
    /// String or list of input parts
    #[serde(default)]
    pub content: Value,
    /// Present when the entry is a full response object
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub output: Option<Vec<Value>>,
}

impl TranscriptEntry {
    pub fn is_response(&self) -> bool {
        self.output.is_some()
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: ResponsesInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponsesInput {
    Text(String),
    Items(Vec<InputItem>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    Message { role: String, content: String },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput { call_id: String, output: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::parse_lenient;
    use serde_json::json;

    #[test]
    fn test_unknown_items_are_tolerated() {
        let response: ResponseObject = parse_lenient(&json!({
            "id": "resp_1",
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "Hi", "annotations": []},
                    {"type": "something_new"}
                ]},
                {"type": "function_call", "call_id": "c1", "name": "f", "arguments": "{}"}
            ]
        }));

        assert_eq!(response.output.len(), 3);
        assert!(matches!(response.output[0], OutputItem::Unknown));
        assert!(response.output[2].as_tool_call().is_some());
    }

    #[test]
    fn test_function_call_pairs_serialize_in_order() {
        let input = ResponsesInput::Items(vec![
            InputItem::FunctionCall {
                call_id: "c1".to_string(),
                name: "f".to_string(),
                arguments: "{}".to_string(),
            },
            InputItem::FunctionCallOutput {
                call_id: "c1".to_string(),
                output: "ok".to_string(),
            },
        ]);
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value[0]["type"], "function_call");
        assert_eq!(value[1]["type"], "function_call_output");
        assert_eq!(value[1]["call_id"], "c1");
    }

    #[test]
    fn test_file_search_hit_text_from_parts() {
        let hit: FileSearchHit = serde_json::from_value(json!({
            "file_id": "file_1",
            "file_name": "faq.md",
            "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]
        }))
        .unwrap();
        assert_eq!(hit.filename.as_deref(), Some("faq.md"));
        assert_eq!(hit.text(), "a\nb");
    }
}
