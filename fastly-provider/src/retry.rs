//! Bounded exponential backoff for polling remote operations

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Policy used while waiting for TLS subscriptions to be issued
    pub const TLS_VALIDATION: RetryPolicy = RetryPolicy {
        initial: Duration::from_secs(10),
        max_delay: Duration::from_secs(60),
        timeout: Duration::from_secs(45 * 60),
    };
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::TLS_VALIDATION
    }
}

/// Outcome of one attempt, or of the whole loop
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: std::fmt::Display> {
    #[error("{0}")]
    Retryable(E),

    #[error("{0}")]
    Fatal(E),

    #[error("timed out after {elapsed:?}: {last}")]
    Timeout { elapsed: Duration, last: E },
}

impl<E: std::fmt::Display> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Retryable(e) | RetryError::Fatal(e) => e,
            RetryError::Timeout { last, .. } => last,
        }
    }
}

/// Run `op` until it succeeds, fails fatally, or the policy times out
///
/// The delay doubles after each retryable failure up to `max_delay`. The last
/// retryable error is reported on timeout.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetryError<E>>>,
{
    let started = Instant::now();
    let mut delay = policy.initial;

    loop {
        let last = match op().await {
            Ok(value) => return Ok(value),
            Err(RetryError::Retryable(e)) => e,
            Err(other) => return Err(other),
        };

        let elapsed = started.elapsed();
        if elapsed + delay > policy.timeout {
            return Err(RetryError::Timeout { elapsed, last });
        }

        log::debug!("retrying in {:?}: {}", delay, last);
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(policy.max_delay);
    }
}
