//! Error types for MCP operations.

use bridge_types::{ToolError, TransportError};
use thiserror::Error;

/// Errors from tool server communication.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to start tool server '{command}': {reason}")]
    TransportStart { command: String, reason: String },

    #[error("JSON-RPC error (code {code}): {message}")]
    JsonRpc { code: i64, message: String },

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("'{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error("Tool server connection broken: {0}")]
    TransportBroken(String),

    #[error("Tool '{tool}' reported an error: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    /// Map a failed `tools/call` for `tool` onto the loop's error taxonomy.
    pub fn into_tool_error(self, tool: &str) -> ToolError {
        match self {
            McpError::Timeout { timeout_ms, .. } => ToolError::Timeout {
                tool: tool.to_string(),
                timeout_ms,
            },
            McpError::JsonRpc { code, message } => ToolError::ExecutionFailed {
                tool: tool.to_string(),
                message: format!("{message} (code {code})"),
            },
            McpError::ToolExecution { tool, message } => {
                ToolError::ExecutionFailed { tool, message }
            }
            McpError::Protocol(reason) => ToolError::Protocol(reason),
            McpError::Json(e) => ToolError::Protocol(e.to_string()),
            McpError::TransportBroken(reason) => ToolError::TransportBroken(reason),
            McpError::Io(e) => ToolError::TransportBroken(e.to_string()),
            McpError::TransportStart { command, reason } => {
                ToolError::TransportBroken(format!("{command}: {reason}"))
            }
        }
    }
}

impl From<McpError> for TransportError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::TransportStart { command, reason } => {
                TransportError::Start { command, reason }
            }
            McpError::Protocol(reason) => TransportError::Protocol(reason),
            McpError::Json(e) => TransportError::Protocol(e.to_string()),
            McpError::JsonRpc { code, message } => {
                TransportError::Protocol(format!("{message} (code {code})"))
            }
            other => TransportError::Broken(other.to_string()),
        }
    }
}
