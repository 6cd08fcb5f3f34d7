//! ToolServer trait: the loop's view of the tool server channel.

use crate::{PromptMessage, ToolError, ToolInvocationRequest, ToolInvocationResult};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// A boxed future returned by [`ToolServer`] methods.
pub type ServerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ToolError>> + Send + 'a>>;

/// A running tool server that can execute calls and render prompts.
pub trait ToolServer: Send + Sync {
    /// Execute one tool call. Blocks until the server answers or the
    /// per-call timeout elapses.
    fn invoke<'a>(
        &'a self,
        request: &'a ToolInvocationRequest,
    ) -> ServerFuture<'a, ToolInvocationResult>;

    /// Render a server-side prompt template with string arguments.
    fn get_prompt<'a>(
        &'a self,
        name: &'a str,
        arguments: HashMap<String, String>,
    ) -> ServerFuture<'a, Vec<PromptMessage>>;
}
