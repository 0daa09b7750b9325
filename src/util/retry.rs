//! Retry with exponential backoff and jitter for transport calls.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::AgentRunError;

/// Retry policy for a single remote operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Default policy with a different attempt budget.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Execute an async operation, retrying only retryable errors.
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut call: F) -> Result<T, AgentRunError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AgentRunError>>,
    {
        let max_attempts = self.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() || attempt >= max_attempts => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Retrying after transport error"
                    );

                    tokio::time::sleep(self.delay(attempt)).await;
                }
            }
        }

        Err(AgentRunError::Exhausted(format!(
            "{operation}: no attempts were made"
        )))
    }

    /// [`RetryPolicy::execute`] that stops waiting as soon as `cancel` fires.
    ///
    /// The in-flight call is dropped, so the caller cannot tell whether it
    /// reached the service.
    pub async fn execute_until_cancelled<F, Fut, T>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T, AgentRunError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AgentRunError>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentRunError::Cancelled),
            result = self.execute(operation, call) => result,
        }
    }

    /// Jittered wait after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let backoff = (self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent))
            .min(self.max_backoff.as_secs_f64());
        // Jitter: 75%-125% of backoff
        let jitter_factor = 0.75 + (rand_factor() * 0.5);
        Duration::from_secs_f64(backoff * jitter_factor)
    }
}

/// Simple pseudo-random factor [0, 1) without pulling in rand crate.
fn rand_factor() -> f64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);

    let hash = hasher.finish();
    (hash % 10000) as f64 / 10000.0
}
