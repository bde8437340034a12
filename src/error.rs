//! Error types for the local agent runtime

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the SDK
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem I/O error (persisted state, memory store)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// API error from the model server
    #[error("API error: {0}")]
    Api(String),

    /// Streaming error
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Tool execution error
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout error
    #[error("Request timeout")]
    Timeout,

    /// Input failed schema or value validation before any work was attempted
    #[error("Validation error: {0}")]
    Validation(String),

    /// The circuit breaker for this operation key is open
    #[error("Circuit open for {operation_key}, retry after {retry_after_secs}s")]
    CircuitOpen {
        operation_key: String,
        retry_after_secs: u64,
    },

    /// No task exists with the given id
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// The decision engine rejected the request outright
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The decision engine requires human approval before this can proceed
    #[error("Approval required: {0}")]
    ApprovalRequired(String),

    /// The decision engine requires additional context before this can proceed
    #[error("Context required: {0:?}")]
    ContextRequired(Vec<String>),

    /// The operation was cancelled via a cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new API error
    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create a new tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Error::Timeout
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a new task-not-found error
    pub fn task_not_found(id: impl Into<String>) -> Self {
        Error::TaskNotFound(id.into())
    }

    /// Create a new rejected error
    pub fn rejected(msg: impl Into<String>) -> Self {
        Error::Rejected(msg.into())
    }

    /// Create a new approval-required error
    pub fn approval_required(msg: impl Into<String>) -> Self {
        Error::ApprovalRequired(msg.into())
    }

    /// Create a new context-required error
    pub fn context_required(needed: Vec<String>) -> Self {
        Error::ContextRequired(needed)
    }

    /// Returns whether this error kind is safe to retry.
    ///
    /// Validation/config/rejected/approval/context errors reflect a
    /// property of the request itself, not a transient failure, so
    /// retrying them would just reproduce the same error.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Config(_)
                | Error::InvalidInput(_)
                | Error::Validation(_)
                | Error::Rejected(_)
                | Error::ApprovalRequired(_)
                | Error::ContextRequired(_)
                | Error::TaskNotFound(_)
                | Error::Cancelled
        )
    }
}
