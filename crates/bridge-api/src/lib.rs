//! OpenAI-compatible chat-completions client for mcp-bridge.

mod client;
mod provider;
mod retry;

pub use client::ApiClient;
pub use provider::OpenAiCompatProvider;
pub use retry::RetryConfig;
