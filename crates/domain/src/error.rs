/// Shared error type used across all group-chat orchestration crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Bad client input: unknown agent, empty content, invalid trim count.
    /// Recoverable — surfaced to the issuing observer, the run continues.
    #[error("validation: {0}")]
    Validation(String),

    /// Bad run configuration: missing participants, duplicate names,
    /// invalid termination. Fails run start.
    #[error("config: {0}")]
    Config(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("tool {tool}: {message}")]
    Tool { tool: String, message: String },

    /// A structural invariant of the conversation tree or thread was
    /// violated (e.g. a `ToolCallExecution` with no matching preceding
    /// `ToolCallRequest`). Unrecoverable — terminates the run.
    #[error("tree corrupted: {0}")]
    TreeCorrupted(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// Raised when an in-flight operation observes its cancellation token
    /// tripped. Swallowed at the call site, never surfaced to observers.
    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable code for the observer wire protocol's
    /// `error{error_code, message}` frame.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Validation(_) => "validation_error",
            Error::Config(_) => "config_error",
            Error::Provider { .. } => "provider_error",
            Error::Tool { .. } => "tool_error",
            Error::TreeCorrupted(_) => "tree_corrupted",
            Error::Timeout(_) => "timeout",
            Error::Cancelled => "cancelled",
            Error::Other(_) => "other",
        }
    }
}
