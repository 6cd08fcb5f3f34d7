//! Interactive session state machine: one conversation, one agent, driven a
//! line of user input at a time.

use crate::agent::{Agent, AgentEvent};
use crate::conversation::Conversation;
use bridge_types::{BridgeError, Usage};
use tokio_util::sync::CancellationToken;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingUserInput,
    QueryingModel,
    DispatchingTool,
    PresentingAnswer,
    Closed,
}

/// What a line of input led to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStep {
    /// The model's final answer for this turn.
    Answer(String),
    /// Blank input; nothing was sent.
    Ignored,
    /// The session has ended.
    Closed,
}

/// A single-user chat session over one tool server.
pub struct ChatSession {
    agent: Agent,
    conversation: Conversation,
    quit_command: String,
    state: SessionState,
    usage: Usage,
    tool_calls: usize,
}

impl ChatSession {
    pub fn new(agent: Agent, quit_command: impl Into<String>) -> Self {
        Self {
            agent,
            conversation: Conversation::new(),
            quit_command: quit_command.into(),
            state: SessionState::AwaitingUserInput,
            usage: Usage::default(),
            tool_calls: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Token usage accumulated over the whole session.
    pub fn usage(&self) -> &Usage {
        &self.usage
    }

    /// Tool calls dispatched over the whole session.
    pub fn tool_calls(&self) -> usize {
        self.tool_calls
    }

    /// Whether `line` is the quit sentinel (trimmed, case-insensitive).
    pub fn is_quit(&self, line: &str) -> bool {
        line.trim().eq_ignore_ascii_case(&self.quit_command)
    }

    /// Mark the session closed, e.g. on end of input.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Handle one line of user input.
    ///
    /// Errors that leave the tool server unusable close the session. Model
    /// API errors end only the current turn.
    pub async fn handle_input<F>(
        &mut self,
        line: &str,
        cancel: CancellationToken,
        mut on_event: F,
    ) -> Result<SessionStep, BridgeError>
    where
        F: FnMut(AgentEvent),
    {
        if self.state == SessionState::Closed {
            return Ok(SessionStep::Closed);
        }

        let line = line.trim();
        if line.is_empty() {
            return Ok(SessionStep::Ignored);
        }
        if self.is_quit(line) {
            tracing::debug!("Quit command received");
            self.close();
            return Ok(SessionStep::Closed);
        }

        self.conversation.append_user(line);
        self.state = SessionState::QueryingModel;

        let state = &mut self.state;
        let result = self
            .agent
            .respond(&mut self.conversation, cancel, |event| {
                match &event {
                    AgentEvent::ToolStart { .. } => *state = SessionState::DispatchingTool,
                    AgentEvent::ToolEnd { .. } => *state = SessionState::QueryingModel,
                    AgentEvent::Done => *state = SessionState::PresentingAnswer,
                    _ => {}
                }
                on_event(event);
            })
            .await;

        match result {
            Ok(outcome) => {
                self.usage.add(&outcome.usage);
                self.tool_calls += outcome.tool_calls;
                self.state = SessionState::AwaitingUserInput;
                Ok(SessionStep::Answer(outcome.answer))
            }
            Err(e) => {
                self.state = if ends_session(&e) {
                    SessionState::Closed
                } else {
                    SessionState::AwaitingUserInput
                };
                Err(e)
            }
        }
    }
}

/// Errors after which the session cannot continue.
pub fn ends_session(error: &BridgeError) -> bool {
    match error {
        BridgeError::Transport(_) | BridgeError::Other(_) => true,
        BridgeError::Api(_) | BridgeError::Cancelled => false,
    }
}
