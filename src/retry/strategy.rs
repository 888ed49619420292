// src/retry/strategy.rs

use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryStrategy {
    config: RetryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

impl RetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Runs `f` until it succeeds, `should_retry` refuses the error, or the
    /// configured attempts are used up. Returns the last error.
    pub async fn execute<F, Fut, T, E>(
        &self,
        mut f: F,
        should_retry: impl Fn(&E) -> RetryDecision,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match f().await {
                Ok(result) => return Ok(result),
                Err(error) => match should_retry(&error) {
                    RetryDecision::NoRetry => {
                        debug!("Error is non-retryable: {}", error);
                        return Err(error);
                    }
                    RetryDecision::Retry => {
                        if attempt >= self.config.max_attempts {
                            warn!("Retry failed after {} attempts: {}", attempt, error);
                            return Err(error);
                        }

                        let backoff = self.calculate_backoff(attempt);
                        debug!(
                            "Attempt {} failed: {}. Retrying in {:?}",
                            attempt, error, backoff
                        );

                        sleep(backoff).await;
                    }
                },
            }
        }
    }

    /// Calculate exponential backoff with jitter
    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base().as_millis() as u64;
        let max = self.config.backoff_max().as_millis() as u64;

        // Exponential backoff: base * 2^(attempt - 1)
        let exponential = base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));

        let capped = exponential.min(max);

        // Add jitter (0-25% of the calculated backoff)
        let jitter = (capped as f64 * rand::random::<f64>() * 0.25) as u64;

        Duration::from_millis(capped + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            backoff_base_ms: 10,
            backoff_max_ms: 100,
        }
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let strategy = RetryStrategy::new(config(3));
        let counter = Arc::new(AtomicU32::new(0));

        let result = strategy
            .execute(
                || {
                    let counter = counter.clone();
                    async move {
                        let count = counter.fetch_add(1, Ordering::SeqCst);
                        if count < 2 {
                            Err("Temporary failure")
                        } else {
                            Ok("Success")
                        }
                    }
                },
                |_| RetryDecision::Retry,
            )
            .await;

        assert_eq!(result.unwrap(), "Success");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_max_attempts() {
        let strategy = RetryStrategy::new(config(2));
        let counter = Arc::new(AtomicU32::new(0));

        let result: Result<(), &str> = strategy
            .execute(
                || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err("Always fails")
                    }
                },
                |_| RetryDecision::Retry,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let strategy = RetryStrategy::new(config(5));
        let counter = Arc::new(AtomicU32::new(0));

        let result: Result<(), &str> = strategy
            .execute(
                || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err("refused")
                    }
                },
                |_| RetryDecision::NoRetry,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_is_capped() {
        let strategy = RetryStrategy::new(config(10));
        let backoff = strategy.calculate_backoff(20);
        assert!(backoff <= Duration::from_millis(125));
    }
}
