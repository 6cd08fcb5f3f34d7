//! JSON-RPC 2.0 framing for MCP over stdio.

use serde::{Deserialize, Serialize};

/// Error code for a method the client does not implement.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response to one of our requests.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    pub id: u64,
    pub result: Option<serde_json::Value>,
    pub error: Option<JsonRpcError>,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Our reply to a request the server sent us.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcReply {
    pub jsonrpc: &'static str,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcReply {
    pub fn result(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn method_not_found(id: serde_json::Value, method: &str) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {method}"),
                data: None,
            }),
        }
    }
}

/// Any line the server writes to stdout, classified.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// Response correlated to one of our request ids.
    Response(JsonRpcResponse),
    /// Request from the server that expects a reply.
    Request {
        id: serde_json::Value,
        method: String,
    },
    /// Fire-and-forget notification from the server.
    Notification { method: String },
    /// Frame carrying one of our request ids that is not a valid response.
    MalformedResponse { id: u64, reason: String },
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

impl IncomingMessage {
    /// Classify one newline-delimited frame.
    pub fn parse(line: &str) -> Result<Self, String> {
        let raw: RawMessage = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(e) => return Self::salvage_id(line, e.to_string()),
        };
        match (raw.id, raw.method) {
            (Some(id), Some(method)) => Ok(IncomingMessage::Request { id, method }),
            (None, Some(method)) => Ok(IncomingMessage::Notification { method }),
            (Some(id), None) => {
                let id = id
                    .as_u64()
                    .ok_or_else(|| format!("response id is not an unsigned integer: {id}"))?;
                if raw.result.is_none() && raw.error.is_none() {
                    return Ok(IncomingMessage::MalformedResponse {
                        id,
                        reason: format!("response {id} has neither result nor error"),
                    });
                }
                Ok(IncomingMessage::Response(JsonRpcResponse {
                    id,
                    result: raw.result,
                    error: raw.error,
                }))
            }
            (None, None) => Err("message has neither id nor method".to_string()),
        }
    }

    /// A JSON object with a numeric id but an invalid shape still answers that id.
    fn salvage_id(line: &str, reason: String) -> Result<Self, String> {
        let Ok(serde_json::Value::Object(map)) = serde_json::from_str(line) else {
            return Err(reason);
        };
        if map.contains_key("method") {
            return Err(reason);
        }
        match map.get("id").and_then(serde_json::Value::as_u64) {
            Some(id) => Ok(IncomingMessage::MalformedResponse {
                id,
                reason: format!("invalid response {id}: {reason}"),
            }),
            None => Err(reason),
        }
    }
}
