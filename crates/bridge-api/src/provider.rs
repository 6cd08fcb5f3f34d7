//! `Provider` implementation over the chat-completions client.

use crate::client::ApiClient;
use crate::retry::RetryConfig;
use bridge_types::provider::Provider;
use bridge_types::{ApiError, ChatRequest, ChatResponse};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Provider for OpenAI-compatible endpoints (DeepSeek, OpenAI, ...).
///
/// Thin wrapper so the agent can hold an `Arc<dyn Provider>`; retry logic
/// stays in `ApiClient`.
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    client: ApiClient,
}

impl OpenAiCompatProvider {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            client: ApiClient::new(api_key, base_url, timeout)?,
        })
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.client = self.client.with_retry_config(config);
        self
    }
}

impl Provider for OpenAiCompatProvider {
    fn chat_completion<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ChatResponse, ApiError>> + Send + 'a>> {
        Box::pin(self.client.chat_completion(request))
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}
