//! Tool catalog, conversation state and the tool-calling loop for mcp-bridge.

mod agent;
mod catalog;
mod conversation;
mod session;

pub use agent::{Agent, AgentEvent, DEFAULT_MAX_TOOL_ROUNDS, EMPTY_REPLY_NOTICE, TurnOutcome};
pub use catalog::ToolCatalog;
pub use conversation::{Conversation, ConversationTurn};
pub use session::{ChatSession, SessionState, SessionStep, ends_session};
