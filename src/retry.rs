//! Bounded retry with exponential backoff for external calls.
//!
//! Both collaborator clients (price lookup, image analysis) route their
//! calls through [`with_retry`]. Each attempt is wrapped in a timeout;
//! failures back off exponentially up to the configured cap. Exhaustion
//! surfaces as [`EngineError::RetryExhausted`], which callers downgrade
//! to an "unavailable" outcome rather than propagate.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;
use crate::types::EngineError;

/// Backoff delay before the next attempt: `base * 2^(attempt-1)`,
/// capped at `max_delay_ms`. `attempt` is 1-based.
pub fn backoff_delay(policy: &RetryConfig, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    let ms = policy.base_delay_ms.saturating_mul(factor).min(policy.max_delay_ms);
    Duration::from_millis(ms)
}

/// Run `call` up to `policy.max_attempts` times, each attempt bounded by
/// `timeout`. Returns the first success, or `RetryExhausted` carrying the
/// last failure.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryConfig,
    timeout: Duration,
    operation: &str,
    mut call: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut last_error = String::new();

    for attempt in 1..=policy.max_attempts {
        match tokio::time::timeout(timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => {
                last_error = format!("{err:#}");
            }
            Err(_) => {
                last_error = format!("timed out after {}ms", timeout.as_millis());
            }
        }

        warn!(
            operation,
            attempt,
            max_attempts = policy.max_attempts,
            error = %last_error,
            "external call failed",
        );

        if attempt < policy.max_attempts {
            tokio::time::sleep(backoff_delay(policy, attempt)).await;
        }
    }

    Err(EngineError::RetryExhausted {
        operation: operation.to_string(),
        attempts: policy.max_attempts,
        message: last_error,
    })
}
