//! Retry with exponential backoff for chat-completions requests.

use bridge_types::ApiError;
use rand::Rng;

/// Configuration for retry behavior on transient API errors.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Delay in milliseconds before the first retry.
    pub initial_delay_ms: u64,
    /// Upper bound in milliseconds for any single delay.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// A config that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Milliseconds to wait before retry number `attempt` (0-based).
    ///
    /// A server-provided `Retry-After` wins (capped at `max_delay_ms`);
    /// otherwise `initial_delay_ms * backoff_factor^attempt` with ±20% jitter.
    pub fn delay_ms(&self, attempt: u32, retry_after_ms: Option<u64>) -> u64 {
        if let Some(server_delay) = retry_after_ms {
            return server_delay.min(self.max_delay_ms);
        }

        let base = self.initial_delay_ms as f64 * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_delay_ms as f64);
        let jitter = rand::rng().random_range(0.8..=1.2);

        ((capped * jitter) as u64).min(self.max_delay_ms)
    }
}

/// Whether a failed request is worth repeating.
///
/// Rate limits, overload, 5xx, network failures and timeouts are transient.
/// Auth, bad requests and undecodable replies will fail the same way again.
pub fn is_retryable(error: &ApiError) -> bool {
    match error {
        ApiError::RateLimited { .. }
        | ApiError::Overloaded
        | ApiError::Network(_)
        | ApiError::Timeout => true,
        ApiError::Server { status, .. } => *status >= 500,
        ApiError::Auth { .. } | ApiError::BadRequest { .. } | ApiError::InvalidResponse(_) => {
            false
        }
    }
}
