//! Source call retry logic
//!
//! Every source call runs under a per-attempt timeout with exponential backoff
//! between attempts, and races the athlete's cancellation token.
//!
//! **Algorithm:**
//! 1. Attempt the call under `timeout`
//! 2. Success: return the records
//! 3. `Unavailable` / `Timeout`: back off and retry until `max_attempts`
//! 4. `Rejected`: return immediately (no retry)
//! 5. Token cancelled at any point: return `Cancelled`
//!
//! **Backoff:** starts at `initial_backoff`, doubles each retry, capped at
//! `max_backoff`.

use crate::types::{RawRecord, SourceError};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Timeout and backoff settings for one source call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// Attempts including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
        }
    }
}

/// Call a source with timeout, retries and cancellation
///
/// # Arguments
/// * `source_name` - Name for logging and timeout errors
/// * `policy` - Timeout and backoff settings
/// * `cancel` - Athlete cancellation token
/// * `operation` - Closure producing one attempt
pub async fn retry_source_call<F, Fut>(
    source_name: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<Vec<RawRecord>, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<RawRecord>, SourceError>>,
{
    let start_time = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.initial_backoff;
    let mut attempt = 0;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(source = source_name, attempt, "Retrying source call");
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SourceError::Cancelled),
            outcome = tokio::time::timeout(policy.timeout, operation()) => match outcome {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout {
                    source_name: source_name.to_string(),
                    timeout_ms: policy.timeout.as_millis() as u64,
                }),
            },
        };

        let err = match result {
            Ok(records) => {
                if attempt > 1 {
                    tracing::debug!(
                        source = source_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Source call succeeded after retry"
                    );
                }
                return Ok(records);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            tracing::warn!(source = source_name, attempt, error = %err, "Source call failed (not retryable)");
            return Err(err);
        }

        if attempt >= max_attempts {
            tracing::warn!(
                source = source_name,
                attempt,
                elapsed_ms = start_time.elapsed().as_millis() as u64,
                error = %err,
                "Source call failed: retries exhausted"
            );
            return Err(err);
        }

        tracing::debug!(
            source = source_name,
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "Source call failed, backing off"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SourceError::Cancelled),
            _ = tokio::time::sleep(backoff) => {}
        }

        backoff = (backoff * 2).min(policy.max_backoff);
    }
}
