//! Provider trait for LLM API providers.

use crate::{ApiError, ChatRequest, ChatResponse};
use std::future::Future;
use std::pin::Pin;

/// Trait for chat-completions providers.
///
/// Dyn-compatible so the agent works with `Arc<dyn Provider>`.
pub trait Provider: Send + Sync {
    /// Send one chat-completions request and wait for the full reply.
    fn chat_completion<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ChatResponse, ApiError>> + Send + 'a>>;

    /// Provider name for logging/display (e.g., "openai-compatible").
    fn name(&self) -> &str;
}
