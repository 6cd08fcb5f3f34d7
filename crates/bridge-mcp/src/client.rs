//! MCP client — owns one tool server connection.
//!
//! Handles the MCP protocol handshake (initialize + initialized notification),
//! tool discovery (tools/list), tool invocation (tools/call) and prompt
//! rendering (prompts/get).

use crate::config::ServerCommand;
use crate::error::McpError;
use crate::transport::StdioTransport;
use bridge_types::{PromptMessage, Role, ToolDescriptor};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// MCP protocol version we support.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Upper bound on `tools/list` pages, guarding against a cursor loop.
const MAX_LIST_PAGES: usize = 64;

/// Result of calling a tool on the server.
#[derive(Debug, Clone)]
pub struct McpToolResult {
    pub content: Vec<McpContent>,
    pub is_error: bool,
}

impl McpToolResult {
    /// Concatenate text items; other content is summarized in brackets.
    pub fn flatten(&self) -> String {
        self.content
            .iter()
            .map(|item| match item {
                McpContent::Text { text } => text.clone(),
                McpContent::Image { mime_type, .. } => format!("[image: {mime_type}]"),
                McpContent::Audio { mime_type, .. } => format!("[audio: {mime_type}]"),
                McpContent::Resource { resource } => match &resource.text {
                    Some(text) => text.clone(),
                    None => format!("[resource: {}]", resource.uri),
                },
                McpContent::ResourceLink { uri } => format!("[resource: {uri}]"),
                McpContent::Other => "[unsupported content]".to_string(),
            })
            .collect()
    }
}

/// A content item in a tool result or prompt message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum McpContent {
    Text {
        text: String,
    },
    Image {
        #[serde(default)]
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Audio {
        #[serde(default)]
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: EmbeddedResource,
    },
    ResourceLink {
        uri: String,
    },
    #[serde(other)]
    Other,
}

/// The resource body of an embedded `resource` content item.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddedResource {
    pub uri: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Client for a single tool server.
pub struct McpClient {
    server: String,
    transport: StdioTransport,
    tool_timeout: Duration,
    request_timeout: Duration,
    shutdown_grace: Duration,
}

#[derive(Deserialize)]
struct InitializeResult {
    #[serde(default, rename = "protocolVersion")]
    protocol_version: Option<String>,
    #[serde(default, rename = "serverInfo")]
    server_info: Option<ServerInfo>,
}

#[derive(Deserialize)]
struct ServerInfo {
    name: String,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Deserialize)]
struct ToolsListResult {
    tools: Vec<ToolEntry>,
    #[serde(default, rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct ToolEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_schema", rename = "inputSchema")]
    input_schema: serde_json::Value,
}

fn default_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

#[derive(Deserialize)]
struct ToolCallResult {
    #[serde(default)]
    content: Vec<McpContent>,
    #[serde(default, rename = "isError")]
    is_error: bool,
}

#[derive(Deserialize)]
struct GetPromptResult {
    #[serde(default)]
    messages: Vec<PromptEntry>,
}

#[derive(Deserialize)]
struct PromptEntry {
    role: Role,
    content: McpContent,
}

impl McpClient {
    /// Launch the server and complete the handshake.
    ///
    /// Any failure before the handshake completes, including the process
    /// exiting straight away, is reported as `TransportStart`.
    pub async fn start(command: &ServerCommand) -> Result<Self, McpError> {
        let server = command.display();
        let transport = StdioTransport::spawn(
            &command.command,
            &command.args,
            &command.env,
            command.quiet_stderr,
        )?;

        let client = Self {
            server,
            transport,
            tool_timeout: command.tool_timeout,
            request_timeout: command.startup_timeout,
            shutdown_grace: command.shutdown_grace,
        };

        match client.handshake().await {
            Ok(()) => Ok(client),
            Err(e) => {
                let server = client.server.clone();
                client.shutdown().await;
                Err(McpError::TransportStart {
                    command: server,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn handshake(&self) -> Result<(), McpError> {
        let init_params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "mcp-bridge",
                "version": env!("CARGO_PKG_VERSION")
            }
        });

        let result = self.request("initialize", Some(init_params)).await?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("Failed to parse initialize result: {e}")))?;

        match init.server_info {
            Some(info) => tracing::info!(
                "Connected to '{}' {} (protocol {})",
                info.name,
                info.version.unwrap_or_default(),
                init.protocol_version.as_deref().unwrap_or("unknown")
            ),
            None => tracing::info!("Connected to '{}'", self.server),
        }

        self.transport
            .send_notification("notifications/initialized", None)
            .await
    }

    /// Send a control request and unwrap its result.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let resp = self
            .transport
            .send_request(method, params, self.request_timeout)
            .await?;
        if let Some(err) = resp.error {
            return Err(McpError::JsonRpc {
                code: err.code,
                message: err.message,
            });
        }
        resp.result
            .ok_or_else(|| McpError::Protocol(format!("{method} response has no result")))
    }

    /// Fetch the server's tool list, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor
                .take()
                .map(|c| serde_json::json!({ "cursor": c }));
            let result = self.request("tools/list", params).await?;
            let page: ToolsListResult = serde_json::from_value(result).map_err(|e| {
                McpError::Protocol(format!("Failed to parse tools/list response: {e}"))
            })?;

            tools.extend(page.tools.into_iter().map(|t| ToolDescriptor {
                name: t.name,
                description: t.description.unwrap_or_default(),
                input_schema: t.input_schema,
            }));

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => {
                    tracing::info!("Tool server '{}' offers {} tools", self.server, tools.len());
                    return Ok(tools);
                }
            }
        }

        Err(McpError::Protocol(format!(
            "tools/list did not finish within {MAX_LIST_PAGES} pages"
        )))
    }

    /// Call a tool, bounded by the per-call timeout.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<McpToolResult, McpError> {
        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments,
        });

        let resp = self
            .transport
            .send_request("tools/call", Some(params), self.tool_timeout)
            .await?;

        if let Some(err) = resp.error {
            return Err(McpError::JsonRpc {
                code: err.code,
                message: err.message,
            });
        }

        let result = resp.result.ok_or_else(|| {
            McpError::Protocol("tools/call response has neither result nor error".to_string())
        })?;

        let call_result: ToolCallResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("Failed to parse tools/call result: {e}")))?;

        Ok(McpToolResult {
            content: call_result.content,
            is_error: call_result.is_error,
        })
    }

    /// Render a prompt template on the server.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<Vec<PromptMessage>, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });
        let result = self.request("prompts/get", Some(params)).await?;
        let prompt: GetPromptResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("Failed to parse prompts/get result: {e}")))?;

        Ok(prompt
            .messages
            .into_iter()
            .map(|m| PromptMessage {
                role: m.role,
                text: McpToolResult {
                    content: vec![m.content],
                    is_error: false,
                }
                .flatten(),
            })
            .collect())
    }

    /// Display name of the server command line.
    pub fn server_name(&self) -> &str {
        &self.server
    }

    /// Per-call tool timeout.
    pub fn tool_timeout(&self) -> Duration {
        self.tool_timeout
    }

    /// Shut down the server connection.
    pub async fn shutdown(self) {
        tracing::debug!("Shutting down tool server '{}'", self.server);
        self.transport.shutdown(self.shutdown_grace).await;
    }
}
