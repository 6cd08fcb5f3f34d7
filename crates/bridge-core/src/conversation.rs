//! Append-only conversation log and its translation into chat messages.

use bridge_types::{
    ChatMessage, FunctionCall, PromptMessage, Role, ToolCall, ToolInvocationRequest,
    ToolInvocationResult,
};

/// One entry in the conversation log.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationTurn {
    User {
        text: String,
    },
    Assistant {
        text: Option<String>,
        tool_calls: Vec<ToolInvocationRequest>,
    },
    ToolResult {
        result: ToolInvocationResult,
    },
}

impl ConversationTurn {
    pub fn role(&self) -> Role {
        match self {
            ConversationTurn::User { .. } => Role::User,
            ConversationTurn::Assistant { .. } => Role::Assistant,
            ConversationTurn::ToolResult { .. } => Role::Tool,
        }
    }
}

/// Ordered history of one chat session. Turns are never removed or
/// reordered.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        self.turns.push(ConversationTurn::User { text: text.into() });
    }

    pub fn append_assistant(
        &mut self,
        text: Option<String>,
        tool_calls: Vec<ToolInvocationRequest>,
    ) {
        self.turns
            .push(ConversationTurn::Assistant { text, tool_calls });
    }

    pub fn append_tool_result(&mut self, result: ToolInvocationResult) {
        self.turns.push(ConversationTurn::ToolResult { result });
    }

    /// Append a message rendered from a server prompt template.
    pub fn append_prompt_message(&mut self, message: PromptMessage) {
        match message.role {
            Role::Assistant => self.append_assistant(Some(message.text), Vec::new()),
            _ => self.append_user(message.text),
        }
    }

    pub fn snapshot(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Call ids from the latest assistant turn that have no result yet.
    pub fn pending_call_ids(&self) -> Vec<String> {
        let Some(pos) = self
            .turns
            .iter()
            .rposition(|t| matches!(t, ConversationTurn::Assistant { tool_calls, .. } if !tool_calls.is_empty()))
        else {
            return Vec::new();
        };
        let ConversationTurn::Assistant { tool_calls, .. } = &self.turns[pos] else {
            return Vec::new();
        };

        let answered: Vec<&str> = self.turns[pos + 1..]
            .iter()
            .filter_map(|t| match t {
                ConversationTurn::ToolResult { result } => Some(result.call_id.as_str()),
                _ => None,
            })
            .collect();

        tool_calls
            .iter()
            .filter(|c| !answered.contains(&c.call_id.as_str()))
            .map(|c| c.call_id.clone())
            .collect()
    }

    /// Render the log as chat-completions messages, prefixed by the system
    /// prompt when one is given.
    pub fn to_messages(&self, system_prompt: Option<&str>) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.turns.len() + 1);
        if let Some(prompt) = system_prompt.filter(|p| !p.is_empty()) {
            messages.push(ChatMessage::system(prompt));
        }

        for turn in &self.turns {
            messages.push(match turn {
                ConversationTurn::User { text } => ChatMessage::user(text.clone()),
                ConversationTurn::Assistant { text, tool_calls } => ChatMessage {
                    role: Role::Assistant,
                    content: text.clone(),
                    tool_calls: tool_calls.iter().map(to_wire_call).collect(),
                    tool_call_id: None,
                },
                ConversationTurn::ToolResult { result } => {
                    ChatMessage::tool(result.call_id.clone(), result.payload.clone())
                }
            });
        }
        messages
    }
}

fn to_wire_call(call: &ToolInvocationRequest) -> ToolCall {
    ToolCall {
        id: call.call_id.clone(),
        call_type: "function".to_string(),
        function: FunctionCall {
            name: call.name.clone(),
            arguments: serde_json::Value::Object(call.arguments.clone()).to_string(),
        },
    }
}
