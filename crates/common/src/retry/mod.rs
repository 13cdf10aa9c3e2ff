//! Bounded retry policy
//!
//! Wraps the `backoff` crate's exponential backoff with a hard attempt cap.
//! Only errors classified as transient are retried; permanent errors and the
//! error from the final attempt are returned to the caller unchanged.

use crate::errors::Result;
use backoff::{future::retry, ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy injected into adapters and the relevance engine
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first call
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy allowing `max_attempts` calls in total (at least one)
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    pub fn with_initial_backoff(mut self, initial: Duration) -> Self {
        self.initial_backoff = initial;
        if self.max_backoff < initial {
            self.max_backoff = initial;
        }
        self
    }

    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff = max.max(self.initial_backoff);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_multiplier(self.multiplier)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt cap is hit
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts;
        let mut attempt = 0u32;

        retry(self.backoff(), || {
            attempt += 1;
            let current = attempt;
            let call = operation();
            async move {
                match call.await {
                    Ok(value) => Ok(value),
                    Err(err) if !err.is_transient() || current >= max_attempts => {
                        Err(backoff::Error::permanent(err))
                    }
                    Err(err) => {
                        warn!(
                            operation = operation_name,
                            attempt = current,
                            max_attempts = max_attempts,
                            error = %err,
                            "Transient failure, retrying"
                        );
                        Err(backoff::Error::transient(err))
                    }
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts).with_initial_backoff(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .run("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AppError::RateLimited { service: "test".into() })
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        tokio_test::assert_ok!(&result);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_at_attempt_cap() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(2)
            .run("always-failing", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(AppError::UpstreamTimeout {
                        service: "test".into(),
                        timeout_ms: 10,
                    })
                }
            })
            .await;

        tokio_test::assert_err!(&result);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(5)
            .run("bad-input", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(AppError::InvalidFormat { message: "nope".into() })
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::InvalidFormat { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_attempts_at_least_one() {
        assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
        assert_eq!(RetryPolicy::no_retry().max_attempts(), 1);
    }
}
