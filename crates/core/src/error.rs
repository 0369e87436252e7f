// Error types for the conversation engine
//
// Normalization never produces these errors: malformed payload fragments are
// recovered where they are read. Everything here either aborts a run or is
// raised before a run starts.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while executing a conversation
#[derive(Debug, Error)]
pub enum EngineError {
    /// Transport, authentication or HTTP status error from a backend
    #[error("Backend error ({class}): {message}")]
    Backend { class: String, message: String },

    /// Backend answered, but the payload is unusable even after normalization
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A thread run reached a terminal status other than `completed`
    #[error("Run {run_id} ended with status {status}: {message}")]
    RunFailed {
        run_id: String,
        status: String,
        message: String,
    },

    /// Unknown backend selection
    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// No adapter factory registered for the requested backend/mode
    #[error("No adapter registered for backend: {0}")]
    BackendNotRegistered(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Run polling exceeded its attempt budget
    #[error(
        "Run polling timed out after {attempts} attempts ({interval_ms}ms interval), last status: {last_status}"
    )]
    PollTimeout {
        attempts: u32,
        interval_ms: u64,
        last_status: String,
    },

    /// Tool execution error
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Interlocutor (simulated user) call failed
    #[error("Interlocutor error: {0}")]
    Simulator(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Create a backend error with an explicit class
    pub fn backend(class: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Backend {
            class: class.into(),
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        EngineError::Protocol(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::Configuration(msg.into())
    }

    /// Create a tool execution error
    pub fn tool(msg: impl Into<String>) -> Self {
        EngineError::ToolExecution(msg.into())
    }

    /// Create an interlocutor error
    pub fn simulator(msg: impl Into<String>) -> Self {
        EngineError::Simulator(msg.into())
    }

    /// False for backend rejections that repeating the same request cannot fix
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self.class(),
            "AuthenticationError"
                | "PermissionDeniedError"
                | "BadRequestError"
                | "NotFoundError"
                | "UnprocessableEntityError"
        )
    }

    /// Stable class name recorded on a failed run
    pub fn class(&self) -> &str {
        match self {
            EngineError::Backend { class, .. } => class.as_str(),
            EngineError::Protocol(_) => "ProtocolError",
            EngineError::RunFailed { .. } => "RunFailed",
            EngineError::UnsupportedBackend(_) => "UnsupportedBackend",
            EngineError::BackendNotRegistered(_) => "BackendNotRegistered",
            EngineError::Configuration(_) => "ConfigurationError",
            EngineError::PollTimeout { .. } => "PollTimeout",
            EngineError::ToolExecution(_) => "ToolExecutionError",
            EngineError::Simulator(_) => "InterlocutorError",
            EngineError::Internal(_) => "InternalError",
        }
    }
}
