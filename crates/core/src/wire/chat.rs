// Chat completions wire types
//
// Request bodies are serialized from these types; response bodies are parsed
// leniently through `parse_lenient`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{lenient, text_from_value, RawArguments, WireUsage};
use crate::tool_types::{ToolCall, ToolDefinition};

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletion {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
    pub choices: Vec<ChatChoice>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub usage: Option<WireUsage>,
}

impl ChatCompletion {
    /// The first choice's message, which is the only one the engine reads
    pub fn first_message(&self) -> Option<&ChatMessage> {
        self.choices.first().map(|c| &c.message)
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.finish_reason.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChoice {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub message: ChatMessage,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub finish_reason: Option<String>,
}

/// A chat message as it appears in responses and in stored histories
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatMessage {
    #[serde(default, deserialize_with = "lenient::string")]
    pub role: String,
    /// String, list of text parts, or null
    #[serde(default)]
    pub content: Value,
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
    pub tool_calls: Vec<ChatToolCall>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub tool_call_id: Option<String>,
    /// Present on stored histories that keep per-message usage
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub usage: Option<WireUsage>,
}

impl ChatMessage {
    pub fn text(&self) -> String {
        text_from_value(&self.content)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatToolCall {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub function: ChatFunctionCall,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatFunctionCall {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default)]
    pub arguments: RawArguments,
}

impl ChatToolCall {
    pub fn to_tool_call(&self) -> ToolCall {
        let arguments = self.function.arguments.to_map(&self.function.name);
        ToolCall::function(self.id.clone(), self.function.name.clone(), arguments)
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatRequestMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ChatTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequestMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ChatRequestToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatRequestMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Assistant message that requested tool calls
    pub fn assistant_tool_calls(content: Option<String>, calls: &[ToolCall]) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            tool_calls: calls
                .iter()
                .map(|call| ChatRequestToolCall {
                    id: call.id.clone(),
                    kind: "function".to_string(),
                    function: ChatRequestFunction {
                        name: call.name.clone(),
                        arguments: call.arguments_json(),
                    },
                })
                .collect(),
            tool_call_id: None,
        }
    }

    /// Tool output answering one call
    pub fn tool_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(output.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequestToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ChatRequestFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequestFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ChatToolFunction,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl From<&ToolDefinition> for ChatTool {
    fn from(tool: &ToolDefinition) -> Self {
        match tool {
            ToolDefinition::Function(f) => ChatTool {
                kind: "function".to_string(),
                function: ChatToolFunction {
                    name: f.name.clone(),
                    description: f.description.clone(),
                    parameters: f.parameters.clone(),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::parse_lenient;
    use serde_json::json;

    #[test]
    fn test_parse_completion_with_tool_calls() {
        let completion: ChatCompletion = parse_lenient(&json!({
            "id": "chatcmpl-1",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "lookup", "arguments": "{\"order\": 7}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
        }));

        let message = completion.first_message().unwrap();
        assert_eq!(message.text(), "");
        let call = message.tool_calls[0].to_tool_call();
        assert_eq!(call.name, "lookup");
        assert_eq!(call.arguments["order"], 7);
        assert_eq!(completion.finish_reason(), Some("tool_calls"));
    }

    #[test]
    fn test_request_skips_empty_fields() {
        let request = ChatCompletionRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatRequestMessage::new("user", "Hi")],
            tools: vec![],
            temperature: None,
            max_tokens: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("tools").is_none());
        assert!(value.get("temperature").is_none());
        assert_eq!(value["messages"][0]["content"], "Hi");
    }
}
