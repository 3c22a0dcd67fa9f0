//! Exponential-backoff retry executor for facilitator calls.
//!
//! Delay for attempt *i* (0-indexed) is `min(base_delay * 2^i, max_delay)`.
//! A non-retryable error, or exhaustion of `max_retries`, propagates the last
//! error unchanged.

use crate::errors::{Result, X402Error};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retry policy for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first (total attempts = `max_retries + 1`)
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay for the given 0-indexed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `op`, retrying on errors accepted by `is_retryable`.
    ///
    /// The default predicate for facilitator traffic is
    /// [`X402Error::is_retryable`]: connection refused/reset, timeouts, DNS
    /// failures and HTTP 5xx.
    pub async fn execute<T, F, Fut, P>(&self, mut op: F, is_retryable: P) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&X402Error) -> bool,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && is_retryable(&err) => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        attempt,
                        ?delay,
                        error = %err,
                        "retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Runs `op` with the default retryability predicate.
    pub async fn execute_default<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute(op, X402Error::is_retryable).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> X402Error {
        X402Error::FacilitatorTimeout {
            endpoint: "/verify".to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy {
            max_retries: 4,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(20));
        // Capped at max_delay from here on.
        assert_eq!(policy.delay_for(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for(10), Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_bound_and_attempt_count() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
        };
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let started = tokio::time::Instant::now();
        let result: Result<()> = policy
            .execute_default(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3); // max_retries + 1
        // 10ms + 20ms of backoff, each delay <= max_delay.
        assert_eq!(started.elapsed(), Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let policy = RetryPolicy::default();
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<()> = policy
            .execute_default(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(X402Error::Paused)
                }
            })
            .await;

        assert!(matches!(result, Err(X402Error::Paused)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        };
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result = policy
            .execute_default(move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient())
                    } else {
                        Ok(42u32)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
