// Tool definitions, tool calls and tool outputs
//
// Design Decision: Tool call arguments are always a materialized JSON object.
// Backends deliver arguments as JSON strings (or occasionally objects); parse
// failures degrade to an empty map and are logged, never surfaced.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Kind of tool call requested by a backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    #[default]
    Function,
}

/// Tool definition offered to a backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    /// Function tool - executed by the injected ToolExecutor
    Function(FunctionTool),
}

impl ToolDefinition {
    /// Create a function tool definition
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        ToolDefinition::Function(FunctionTool {
            name: name.into(),
            description: description.into(),
            parameters,
        })
    }

    /// Tool name as seen by the model
    pub fn name(&self) -> &str {
        match self {
            ToolDefinition::Function(f) => &f.name,
        }
    }
}

/// Function tool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionTool {
    /// Function name (used by the model and for fixture lookup)
    pub name: String,
    /// Description for the model
    #[serde(default)]
    pub description: String,
    /// JSON schema for the function parameters
    #[serde(default = "default_parameters")]
    pub parameters: Value,
}

fn default_parameters() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// Tool call from a backend response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Unique ID for this tool call (the `call_id` on chained responses)
    pub id: String,
    /// Kind of call
    #[serde(rename = "type", default)]
    pub kind: ToolKind,
    /// Function name to execute
    pub name: String,
    /// Parsed arguments
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    /// Create a function call with already-parsed arguments
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ToolKind::Function,
            name: name.into(),
            arguments,
        }
    }

    /// Create a function call from a raw JSON argument string
    pub fn from_json_arguments(
        id: impl Into<String>,
        name: impl Into<String>,
        raw_arguments: &str,
    ) -> Self {
        let name = name.into();
        let arguments = parse_arguments(&name, raw_arguments);
        Self::function(id, name, arguments)
    }

    /// Arguments re-encoded as the JSON string the wire protocols expect
    pub fn arguments_json(&self) -> String {
        Value::Object(self.arguments.clone()).to_string()
    }
}

/// Parse a JSON argument blob into a map.
///
/// Empty input, invalid JSON and non-object JSON all yield an empty map.
pub fn parse_arguments(tool_name: &str, raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(
                tool_name = %tool_name,
                kind = %json_kind(&other),
                "Tool arguments are not a JSON object, using empty arguments"
            );
            Map::new()
        }
        Err(e) => {
            warn!(
                tool_name = %tool_name,
                error = %e,
                "Failed to parse tool arguments, using empty arguments"
            );
            Map::new()
        }
    }
}

/// Coerce an arbitrary JSON value into an argument map
pub fn arguments_from_value(tool_name: &str, value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        Value::String(s) => parse_arguments(tool_name, s),
        Value::Null => Map::new(),
        other => {
            warn!(
                tool_name = %tool_name,
                kind = %json_kind(other),
                "Tool input is not a JSON object, using empty arguments"
            );
            Map::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Output produced for one tool call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolExchange {
    /// The call that was executed
    pub call: ToolCall,
    /// Output payload returned to the backend
    pub output: Value,
}

impl ToolExchange {
    /// Output encoded as the string the wire protocols expect
    pub fn output_string(&self) -> String {
        match &self.output {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
