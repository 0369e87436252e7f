// Conversation Execution Engine
//
// This crate drives multi-turn simulated conversations against three LLM
// backend protocols and canonicalizes their responses into one model that
// downstream scorers consume uniformly.
//
// Key design decisions:
// - Raw payloads are parsed once into typed wire structs (`wire`); normalizers
//   never perform dual-key or untyped lookups
// - Normalization never fails: malformed fragments degrade to defaults
// - Each backend protocol is a BackendAdapter over a transport trait, so live
//   HTTP clients and deterministic fakes are interchangeable
// - Tool round-trips are resolved by a bounded FunctionCallHandler; hitting
//   the bound is a degraded outcome, not an error
// - Live transports live in provider crates (promptlab-openai,
//   promptlab-anthropic) that register themselves into the BackendRegistry

// Canonical model
pub mod language;
pub mod normalized;
pub mod state;
pub mod tool_types;

// Ingestion and normalization
pub mod normalizer;
pub mod tokens;
pub mod tool_results;
pub mod wire;

// Execution
pub mod backends;
pub mod function_calls;
pub mod interlocutor;
pub mod llm_driver;
pub mod orchestrator;

// Configuration, selection and scoring dispatch
pub mod config;
pub mod error;
pub mod evaluators;
pub mod registry;

// In-memory implementations for mock mode and testing
pub mod memory;

pub mod telemetry;

// Re-exports for convenience
pub use backends::{
    AssistantsAdapter, BackendAdapter, BackendKind, BoxedBackendAdapter, ChatCompletionsAdapter,
    ResponsesAdapter, TurnOutcome, TurnRequest,
};
pub use config::{
    BackendConfig, ExecutionMode, InterlocutorConfig, InterlocutorProvider, PollConfig, RunConfig,
    RunConfigBuilder,
};
pub use error::{EngineError, Result};
pub use evaluators::{
    is_eligible, ApiTypeTag, Evaluator, EvaluatorRegistry, RunMode, ScorerDescriptor,
};
pub use function_calls::{FunctionCallHandler, FunctionCallOutcome, ToolExecutor};
pub use interlocutor::InterlocutorSimulator;
pub use llm_driver::{LlmCallConfig, LlmDriver, LlmMessage, LlmMessageRole, LlmResponse};
pub use normalized::{
    Citation, CodeInterpreterResult, CodeOutput, FileSearchResult, MessageRole,
    NormalizedConversation, NormalizedMessage, NormalizedResponse, UsageTotals, WebSearchResult,
    WebSource,
};
pub use normalizer::{normalizer_for, NormalizerKind, ResponseNormalizer};
pub use orchestrator::{run, ConversationOrchestrator, RunOutcome};
pub use registry::BackendRegistry;
pub use state::{ContinuationToken, ConversationState, ConversationStatus};
pub use tool_results::{ToolResultKind, ToolResults};
pub use tool_types::{ToolCall, ToolDefinition};
