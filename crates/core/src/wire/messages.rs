// Messages-API wire types
//
// Content is one typed block array discriminated by `type` (`text`,
// `tool_use`, server-side web search blocks, `tool_result` on user turns).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{lenient, WireUsage};
use crate::tool_types::{arguments_from_value, ToolCall};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagesResponse {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub role: String,
    #[serde(default, deserialize_with = "content_blocks")]
    pub content: Vec<ContentBlock>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub stop_reason: Option<String>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub usage: Option<WireUsage>,
}

impl MessagesResponse {
    /// Text blocks joined with newlines, in block order
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall::function(
                    id.clone(),
                    name.clone(),
                    arguments_from_value(name, input),
                )),
                _ => None,
            })
            .collect()
    }

    /// True when every block is a tool result (a tool round-trip, not a new
    /// user utterance)
    pub fn is_tool_result_only(&self) -> bool {
        !self.content.is_empty()
            && self
                .content
                .iter()
                .all(|b| matches!(b, ContentBlock::ToolResult { .. }))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default, deserialize_with = "lenient::string")]
        text: String,
        #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
        citations: Vec<TextCitation>,
    },
    ToolUse {
        #[serde(default, deserialize_with = "lenient::string")]
        id: String,
        #[serde(default, deserialize_with = "lenient::string")]
        name: String,
        #[serde(default)]
        input: Value,
    },
    ServerToolUse {
        #[serde(default, deserialize_with = "lenient::string")]
        id: String,
        #[serde(default, deserialize_with = "lenient::string")]
        name: String,
        #[serde(default)]
        input: Value,
    },
    WebSearchToolResult {
        #[serde(default, deserialize_with = "lenient::string")]
        tool_use_id: String,
        #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
        content: Vec<WebSearchResultBlock>,
    },
    ToolResult {
        #[serde(default, deserialize_with = "lenient::string")]
        tool_use_id: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextCitation {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebSearchResultBlock {
    #[serde(default, deserialize_with = "lenient::string")]
    pub url: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub title: Option<String>,
}

fn content_blocks<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(text) => vec![ContentBlock::Text {
            text,
            citations: Vec::new(),
        }],
        other => lenient::items_from_value(other),
    })
}

/// Message history fed to conversation normalization
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagesTranscript {
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
    pub messages: Vec<MessagesResponse>,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<MessagesRequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagesRequestMessage {
    pub role: String,
    pub content: String,
}
