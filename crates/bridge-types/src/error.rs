//! Error hierarchy for mcp-bridge.

use thiserror::Error;

/// Top-level error type for a bridge session.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Errors from the chat-completions API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Server overloaded")]
    Overloaded,

    #[error("Server error: {status} {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timeout")]
    Timeout,
}

/// Errors from a single tool invocation.
///
/// `UnknownTool`, `Timeout` and `ExecutionFailed` are recoverable: the loop
/// hands them to the model as an error result. `TransportBroken` and
/// `Protocol` leave the channel unusable and end the session.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Tool '{tool}' timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },

    #[error("Tool '{tool}' failed: {message}")]
    ExecutionFailed { tool: String, message: String },

    #[error("Tool server connection broken: {0}")]
    TransportBroken(String),

    #[error("Tool server protocol error: {0}")]
    Protocol(String),
}

impl ToolError {
    /// Whether this failure makes the tool server channel unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ToolError::TransportBroken(_) | ToolError::Protocol(_))
    }
}

/// Errors from building the tool catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Tool server declared '{name}' more than once")]
    DuplicateTool { name: String },

    #[error("Tool server declared a tool with an empty name")]
    EmptyName,
}

/// Errors that end the tool server channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to start tool server '{command}': {reason}")]
    Start { command: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Tool server exited: {0}")]
    Broken(String),
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file parse error at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Missing required configuration: {key}")]
    MissingKey { key: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

impl From<ToolError> for TransportError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Protocol(reason) => TransportError::Protocol(reason),
            other => TransportError::Broken(other.to_string()),
        }
    }
}
