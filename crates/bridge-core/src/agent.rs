//! The orchestration loop: query the model, run the tools it asks for,
//! feed the results back, repeat until it answers.

use crate::catalog::ToolCatalog;
use crate::conversation::Conversation;
use bridge_types::{
    ApiError, BridgeError, ChatRequest, ToolCall, ToolError, ToolInvocationRequest,
    ToolInvocationResult, Usage, provider::Provider, server::ToolServer, truncate_string,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default bound on consecutive model-to-tools rounds per user turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

/// Answer shown when the model returns neither text nor tool calls.
pub const EMPTY_REPLY_NOTICE: &str = "The model did not produce a reply.";

/// Events emitted by the agent during execution.
#[derive(Debug)]
pub enum AgentEvent {
    /// Text the model produced alongside tool calls.
    Text(String),
    /// A tool is about to be executed.
    ToolStart { name: String, input: String },
    /// A tool has finished executing.
    ToolEnd {
        name: String,
        output: String,
        is_error: bool,
    },
    /// Usage accumulated over the turn.
    Usage(Usage),
    /// Something the user should know that is not the answer itself.
    Notice(String),
    /// The turn is finished.
    Done,
    /// The operation was cancelled (e.g. Ctrl+C).
    Cancelled,
    /// An error occurred.
    Error(String),
}

/// Result of one user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Text to present to the user.
    pub answer: String,
    pub usage: Usage,
    /// Number of tool calls dispatched during the turn.
    pub tool_calls: usize,
}

/// Drives one model and one tool server through a conversation.
pub struct Agent {
    provider: Arc<dyn Provider>,
    server: Arc<dyn ToolServer>,
    catalog: ToolCatalog,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    system_prompt: Option<String>,
    max_tool_rounds: usize,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn Provider>,
        server: Arc<dyn ToolServer>,
        catalog: ToolCatalog,
        model: String,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            server,
            catalog,
            model,
            max_tokens,
            temperature: None,
            system_prompt: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn set_system_prompt(&mut self, prompt: String) {
        self.system_prompt = Some(prompt);
    }

    pub fn set_temperature(&mut self, temperature: f32) {
        self.temperature = Some(temperature);
    }

    pub fn set_max_tool_rounds(&mut self, rounds: usize) {
        self.max_tool_rounds = rounds.max(1);
    }

    /// Run one user turn. The user's message must already be appended.
    ///
    /// Tool calls are executed one at a time in the order the model listed
    /// them, and every call gets exactly one result appended before the
    /// model is queried again. Recoverable tool failures become error
    /// results; a broken channel ends the turn with an error.
    pub async fn respond<F>(
        &self,
        conversation: &mut Conversation,
        cancel: CancellationToken,
        mut on_event: F,
    ) -> Result<TurnOutcome, BridgeError>
    where
        F: FnMut(AgentEvent),
    {
        let mut usage = Usage::default();
        let mut tool_calls = 0;
        let mut round = 0;

        loop {
            round += 1;
            let pending = conversation.pending_call_ids();
            if !pending.is_empty() {
                return Err(BridgeError::Other(format!(
                    "refusing to query the model with unanswered tool calls: {}",
                    pending.join(", ")
                )));
            }

            let request = self.build_request(conversation);
            tracing::debug!(
                "Querying {} with {} messages and {} tools",
                self.model,
                request.messages.len(),
                request.tools.as_ref().map_or(0, Vec::len)
            );

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    on_event(AgentEvent::Cancelled);
                    return Err(BridgeError::Cancelled);
                }
                result = self.provider.chat_completion(&request) => result
            };
            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    on_event(AgentEvent::Error(e.to_string()));
                    return Err(BridgeError::Api(e));
                }
            };

            if let Some(u) = &response.usage {
                usage.add(u);
            }
            let Some(message) = response.first_message() else {
                let err = ApiError::InvalidResponse("reply contains no choices".into());
                on_event(AgentEvent::Error(err.to_string()));
                return Err(BridgeError::Api(err));
            };
            tracing::debug!("Model reply: {message:?}");

            let text = message
                .content
                .clone()
                .filter(|t| !t.trim().is_empty());
            let calls = decode_tool_calls(&message.tool_calls);

            // Plain answer ends the turn
            if calls.is_empty() {
                let answer = match text {
                    Some(text) => {
                        conversation.append_assistant(Some(text.clone()), Vec::new());
                        text
                    }
                    None => {
                        tracing::warn!("Model returned neither text nor tool calls");
                        EMPTY_REPLY_NOTICE.to_string()
                    }
                };
                on_event(AgentEvent::Done);
                on_event(AgentEvent::Usage(usage.clone()));
                return Ok(TurnOutcome {
                    answer,
                    usage,
                    tool_calls,
                });
            }

            if let Some(text) = &text {
                on_event(AgentEvent::Text(text.clone()));
            }
            conversation.append_assistant(text, calls.clone());

            let mut follow_ups = Vec::new();
            for (i, call) in calls.iter().enumerate() {
                on_event(AgentEvent::ToolStart {
                    name: call.name.clone(),
                    input: truncate_string(
                        &serde_json::Value::Object(call.arguments.clone()).to_string(),
                        200,
                    ),
                });

                let outcome = tokio::select! {
                    _ = cancel.cancelled() => {
                        on_event(AgentEvent::Cancelled);
                        close_remaining(conversation, &calls[i..], "cancelled by user");
                        return Err(BridgeError::Cancelled);
                    }
                    outcome = self.dispatch(call) => outcome
                };
                tool_calls += 1;

                let result = match outcome {
                    Ok(result) => result,
                    Err(e) => {
                        on_event(AgentEvent::ToolEnd {
                            name: call.name.clone(),
                            output: e.to_string(),
                            is_error: true,
                        });
                        on_event(AgentEvent::Error(e.to_string()));
                        close_remaining(conversation, &calls[i..], &e.to_string());
                        return Err(BridgeError::Transport(e.into()));
                    }
                };

                on_event(AgentEvent::ToolEnd {
                    name: call.name.clone(),
                    output: truncate_string(&result.payload, 200),
                    is_error: !result.success,
                });

                if result.success {
                    if let Some(template) = PromptTemplate::detect(&result.payload) {
                        follow_ups.push(template);
                    }
                }
                conversation.append_tool_result(result);
            }

            // Prompt messages go after every tool result of this reply
            for template in follow_ups {
                let rendered = tokio::select! {
                    _ = cancel.cancelled() => {
                        on_event(AgentEvent::Cancelled);
                        return Err(BridgeError::Cancelled);
                    }
                    rendered = self.server.get_prompt(&template.name, template.arguments.clone()) => rendered
                };
                match rendered {
                    Ok(messages) => {
                        tracing::debug!(
                            "Prompt '{}' rendered {} messages",
                            template.name,
                            messages.len()
                        );
                        for message in messages {
                            conversation.append_prompt_message(message);
                        }
                    }
                    Err(e) if e.is_fatal() => {
                        on_event(AgentEvent::Error(e.to_string()));
                        return Err(BridgeError::Transport(e.into()));
                    }
                    Err(e) => {
                        tracing::warn!("Failed to render prompt '{}': {e}", template.name);
                    }
                }
            }

            if round >= self.max_tool_rounds {
                let notice = format!(
                    "Stopped after {round} tool rounds without a final answer from the model."
                );
                tracing::warn!("{notice}");
                on_event(AgentEvent::Notice(notice.clone()));
                on_event(AgentEvent::Done);
                on_event(AgentEvent::Usage(usage.clone()));
                return Ok(TurnOutcome {
                    answer: notice,
                    usage,
                    tool_calls,
                });
            }
        }
    }

    fn build_request(&self, conversation: &Conversation) -> ChatRequest {
        let tools = self.catalog.definitions();
        ChatRequest {
            model: self.model.clone(),
            messages: conversation.to_messages(self.system_prompt.as_deref()),
            tools: if tools.is_empty() { None } else { Some(tools) },
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            stream: false,
        }
    }

    /// Run one call. `Err` only for failures that leave the channel unusable.
    async fn dispatch(
        &self,
        call: &ToolInvocationRequest,
    ) -> Result<ToolInvocationResult, ToolError> {
        if let Err(e) = self.catalog.schema_for(&call.name) {
            tracing::warn!("Model requested a tool the server does not offer: {}", call.name);
            return Ok(ToolInvocationResult::failure(&call.call_id, e));
        }

        match self.server.invoke(call).await {
            Ok(result) => {
                tracing::debug!("Tool {} returned: {}", call.name, result.payload);
                Ok(result)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!("Tool {} failed: {e}", call.name);
                Ok(ToolInvocationResult::failure(&call.call_id, e))
            }
        }
    }
}

/// Give each unanswered call an error result so the log stays balanced.
fn close_remaining(conversation: &mut Conversation, calls: &[ToolInvocationRequest], reason: &str) {
    for call in calls {
        conversation.append_tool_result(ToolInvocationResult::failure(&call.call_id, reason));
    }
}

/// Turn the model's wire tool calls into invocation requests.
fn decode_tool_calls(calls: &[ToolCall]) -> Vec<ToolInvocationRequest> {
    calls
        .iter()
        .map(|tc| {
            let call_id = if tc.id.is_empty() {
                format!("call_{}", uuid::Uuid::new_v4().simple())
            } else {
                tc.id.clone()
            };
            ToolInvocationRequest {
                call_id,
                name: tc.function.name.clone(),
                arguments: decode_arguments(&tc.function.name, &tc.function.arguments),
            }
        })
        .collect()
}

/// Parse a function-call `arguments` string. Anything other than a JSON
/// object is replaced by `{}`.
fn decode_arguments(tool: &str, raw: &str) -> serde_json::Map<String, serde_json::Value> {
    if raw.trim().is_empty() {
        return serde_json::Map::new();
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(other) => {
            tracing::warn!("Arguments for {tool} are not an object ({other}); using {{}}");
            serde_json::Map::new()
        }
        Err(e) => {
            tracing::warn!("Unparseable arguments for {tool}: {e}; using {{}}");
            serde_json::Map::new()
        }
    }
}

/// A tool result asking for a server prompt to be rendered into the chat.
#[derive(Debug, Clone, PartialEq)]
struct PromptTemplate {
    name: String,
    arguments: HashMap<String, String>,
}

impl PromptTemplate {
    /// Recognize `{"prompt_template": "...", "template_args": {...}}`.
    fn detect(payload: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(payload.trim()).ok()?;
        let name = value.get("prompt_template")?.as_str()?.trim();
        if name.is_empty() {
            return None;
        }
        let args = value.get("template_args")?.as_object()?;
        let arguments = args
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), v)
            })
            .collect();
        Some(Self {
            name: name.to_string(),
            arguments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::FunctionCall;

    fn wire_call(id: &str, name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }

    #[test]
    fn agent_event_cancelled_debug() {
        let event = AgentEvent::Cancelled;
        assert_eq!(format!("{event:?}"), "Cancelled");
    }

    #[test]
    fn decode_keeps_order_and_ids() {
        let calls = decode_tool_calls(&[
            wire_call("a", "first", r#"{"n":1}"#),
            wire_call("b", "second", r#"{"n":2}"#),
        ]);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].call_id, "a");
        assert_eq!(calls[1].name, "second");
        assert_eq!(calls[1].arguments["n"], 2);
    }

    #[test]
    fn decode_generates_missing_ids() {
        let calls = decode_tool_calls(&[wire_call("", "x", "{}"), wire_call("", "y", "{}")]);
        assert!(calls[0].call_id.starts_with("call_"));
        assert_ne!(calls[0].call_id, calls[1].call_id);
    }

    #[test]
    fn non_object_arguments_become_empty() {
        assert!(decode_arguments("t", "").is_empty());
        assert!(decode_arguments("t", "[1,2]").is_empty());
        assert!(decode_arguments("t", "\"Paris\"").is_empty());
        assert!(decode_arguments("t", "{city: Paris").is_empty());
        assert_eq!(decode_arguments("t", r#"{"city":"Paris"}"#)["city"], "Paris");
    }

    #[test]
    fn prompt_template_detection() {
        let template = PromptTemplate::detect(
            r#"{"prompt_template":"summarize","template_args":{"city":"Paris","days":3}}"#,
        )
        .unwrap();
        assert_eq!(template.name, "summarize");
        assert_eq!(template.arguments["city"], "Paris");
        assert_eq!(template.arguments["days"], "3");

        assert!(PromptTemplate::detect("sunny").is_none());
        assert!(PromptTemplate::detect(r#"{"prompt_template":"x"}"#).is_none());
        assert!(PromptTemplate::detect(r#"{"prompt_template":"","template_args":{}}"#).is_none());
        assert!(PromptTemplate::detect(r#"{"temperature":18}"#).is_none());
    }
}
