//! Bounded retry with exponential backoff

use std::future::Future;
use tracing::{debug, warn};

use crate::Result;
use crate::types::RetryPolicy;

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts.
///
/// The delay after attempt `n` is `initial_delay * 2^n`, capped at
/// `max_delay`. The last error is returned once attempts are exhausted.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    if !e.is_transient() {
                        warn!("{} failed after {} attempts: {}", operation, attempt, e);
                    }
                    return Err(e);
                }

                let backoff = policy.delay_for(attempt - 1);
                debug!("{} failed ({}/{}), retrying in {:?}: {}", operation, attempt, policy.max_attempts, backoff, e);
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
