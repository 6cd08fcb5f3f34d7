//! `ToolServer` implementation backed by an MCP client.

use crate::client::McpClient;
use crate::error::McpError;
use bridge_types::server::{ServerFuture, ToolServer};
use bridge_types::{PromptMessage, ToolInvocationRequest, ToolInvocationResult};
use std::collections::HashMap;

impl ToolServer for McpClient {
    fn invoke<'a>(
        &'a self,
        request: &'a ToolInvocationRequest,
    ) -> ServerFuture<'a, ToolInvocationResult> {
        Box::pin(async move {
            let arguments = serde_json::Value::Object(request.arguments.clone());
            let result = self
                .call_tool(&request.name, arguments)
                .await
                .map_err(|e| e.into_tool_error(&request.name))?;

            let payload = result.flatten();
            if result.is_error {
                return Err(McpError::ToolExecution {
                    tool: request.name.clone(),
                    message: payload,
                }
                .into_tool_error(&request.name));
            }

            Ok(ToolInvocationResult::success(&request.call_id, payload))
        })
    }

    fn get_prompt<'a>(
        &'a self,
        name: &'a str,
        arguments: HashMap<String, String>,
    ) -> ServerFuture<'a, Vec<PromptMessage>> {
        Box::pin(async move {
            McpClient::get_prompt(self, name, &arguments)
                .await
                .map_err(|e| e.into_tool_error(name))
        })
    }
}
