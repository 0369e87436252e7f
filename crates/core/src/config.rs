// Run configuration
//
// RunConfig is the inbound contract of the engine: what to simulate, against
// which backend, for how many turns. It deserializes from run files with
// defaults for everything except the directive and the backend.
//
// The core never reads environment variables; credentials are resolved by the
// caller and set on the config.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::backends::BackendKind;
use crate::evaluators::RunMode;
use crate::function_calls::DEFAULT_MAX_TOOL_ITERATIONS;
use crate::tool_types::ToolDefinition;

/// Live network calls or deterministic fakes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Mock,
    #[default]
    Live,
}

/// Run-status polling policy for the thread/run backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Fixed sleep between polls
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    /// Maximum number of status retrievals
    #[serde(default = "default_poll_max_attempts")]
    pub max_attempts: u32,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_max_attempts() -> u32 {
    60
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            max_attempts: default_poll_max_attempts(),
        }
    }
}

impl PollConfig {
    pub fn new(interval_ms: u64, max_attempts: u32) -> Self {
        Self {
            interval_ms,
            max_attempts,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Backend selection and per-backend settings
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub backend: BackendKind,

    #[serde(default)]
    pub mode: ExecutionMode,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: Option<f32>,

    /// Function tools offered to the backend
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,

    /// Provider-hosted tools passed through verbatim (e.g. `{"type": "web_search"}`);
    /// ignored by the chat backend
    #[serde(default)]
    pub hosted_tools: Vec<Value>,

    /// Bound on tool submit iterations per turn
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,

    /// Pre-registered remote agent (thread/run backend only)
    #[serde(default)]
    pub assistant_id: Option<String>,

    #[serde(default)]
    pub poll: PollConfig,

    /// Canned tool outputs by function name
    #[serde(default)]
    pub mock_fixtures: BTreeMap<String, Value>,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tool_iterations() -> u32 {
    DEFAULT_MAX_TOOL_ITERATIONS
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("backend", &self.backend)
            .field("mode", &self.mode)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("tools", &self.tools.len())
            .field("max_tool_iterations", &self.max_tool_iterations)
            .field("assistant_id", &self.assistant_id)
            .field("poll", &self.poll)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl BackendConfig {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            mode: ExecutionMode::default(),
            model: default_model(),
            temperature: None,
            tools: Vec::new(),
            hosted_tools: Vec::new(),
            max_tool_iterations: default_max_tool_iterations(),
            assistant_id: None,
            poll: PollConfig::default(),
            mock_fixtures: BTreeMap::new(),
            api_key: None,
            base_url: None,
        }
    }

    /// Deterministic fake backend
    pub fn mock(backend: BackendKind) -> Self {
        Self::new(backend).with_mode(ExecutionMode::Mock)
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tool_iterations(mut self, max_tool_iterations: u32) -> Self {
        self.max_tool_iterations = max_tool_iterations;
        self
    }

    pub fn with_assistant_id(mut self, assistant_id: impl Into<String>) -> Self {
        self.assistant_id = Some(assistant_id.into());
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_fixture(mut self, function_name: impl Into<String>, output: Value) -> Self {
        self.mock_fixtures.insert(function_name.into(), output);
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn is_mock(&self) -> bool {
        self.mode == ExecutionMode::Mock
    }

    /// Function tools followed by hosted tools, as request JSON
    pub fn tool_payloads(&self) -> Vec<Value> {
        self.tools
            .iter()
            .filter_map(|tool| serde_json::to_value(tool).ok())
            .chain(self.hosted_tools.iter().cloned())
            .collect()
    }
}

/// Provider for the interlocutor's auxiliary LLM
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterlocutorProvider {
    #[default]
    Openai,
    Anthropic,
}

impl std::fmt::Display for InterlocutorProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterlocutorProvider::Openai => write!(f, "openai"),
            InterlocutorProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Mock => write!(f, "mock"),
            ExecutionMode::Live => write!(f, "live"),
        }
    }
}

/// Settings for the simulated user
#[derive(Clone, Serialize, Deserialize)]
pub struct InterlocutorConfig {
    #[serde(default)]
    pub provider: InterlocutorProvider,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: Option<f32>,

    /// Scripted user turns for mock mode (turn 2 onwards); when exhausted the
    /// mock interlocutor produces numbered follow-ups
    #[serde(default)]
    pub script: Vec<String>,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,
}

impl std::fmt::Debug for InterlocutorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterlocutorConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("script", &self.script.len())
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Default for InterlocutorConfig {
    fn default() -> Self {
        Self {
            provider: InterlocutorProvider::default(),
            model: default_model(),
            temperature: None,
            script: Vec::new(),
            api_key: None,
            base_url: None,
        }
    }
}

/// Configuration for one conversation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Instructions for the simulated user
    pub directive: String,

    /// System directive for the assistant under test
    #[serde(default)]
    pub system_directive: Option<String>,

    /// Turn 1 user message; generated by the interlocutor when absent
    #[serde(default)]
    pub first_message: Option<String>,

    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    #[serde(default)]
    pub mode: RunMode,

    pub backend: BackendConfig,

    #[serde(default)]
    pub interlocutor: InterlocutorConfig,
}

fn default_max_turns() -> u32 {
    5
}

impl RunConfig {
    pub fn new(directive: impl Into<String>, backend: BackendConfig) -> Self {
        Self {
            directive: directive.into(),
            system_directive: None,
            first_message: None,
            max_turns: default_max_turns(),
            mode: RunMode::default(),
            backend,
            interlocutor: InterlocutorConfig::default(),
        }
    }

    pub fn builder(directive: impl Into<String>, backend: BackendConfig) -> RunConfigBuilder {
        RunConfigBuilder::new(directive, backend)
    }
}

/// Builder for RunConfig with fluent API
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    pub fn new(directive: impl Into<String>, backend: BackendConfig) -> Self {
        Self {
            config: RunConfig::new(directive, backend),
        }
    }

    pub fn system_directive(mut self, directive: impl Into<String>) -> Self {
        self.config.system_directive = Some(directive.into());
        self
    }

    pub fn first_message(mut self, message: impl Into<String>) -> Self {
        self.config.first_message = Some(message.into());
        self
    }

    pub fn max_turns(mut self, max_turns: u32) -> Self {
        self.config.max_turns = max_turns;
        self
    }

    pub fn mode(mut self, mode: RunMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn interlocutor(mut self, interlocutor: InterlocutorConfig) -> Self {
        self.config.interlocutor = interlocutor;
        self
    }

    pub fn build(self) -> RunConfig {
        self.config
    }
}
