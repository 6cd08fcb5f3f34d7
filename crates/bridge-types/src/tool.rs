//! Tool descriptors and invocation records.

use serde::{Deserialize, Serialize};

use crate::Role;

/// A tool declared by the tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema of the tool's arguments.
    pub input_schema: serde_json::Value,
}

/// A tool call the model asked for, decoded from its reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationRequest {
    /// Correlation id tying the result back to the assistant turn.
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// Outcome of a tool call, as recorded in the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationResult {
    pub call_id: String,
    pub success: bool,
    /// Tool output on success, error description otherwise.
    pub payload: String,
}

impl ToolInvocationResult {
    pub fn success(call_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            payload: payload.into(),
        }
    }

    pub fn failure(call_id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            payload: format!("Error: {error}"),
        }
    }
}

/// A message produced by a server-side prompt template.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessage {
    pub role: Role,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_payload_is_prefixed() {
        let result = ToolInvocationResult::failure("call_1", "timed out");
        assert!(!result.success);
        assert_eq!(result.payload, "Error: timed out");
        assert_eq!(result.call_id, "call_1");
    }

    #[test]
    fn success_keeps_payload_verbatim() {
        let result = ToolInvocationResult::success("c", r#"{"temperature":18}"#);
        assert!(result.success);
        assert_eq!(result.payload, r#"{"temperature":18}"#);
    }
}
