//! Retry logic for chain reads.
//!
//! Reads are retried a bounded number of times with exponential backoff;
//! write-side operations are never retried automatically, so only the read
//! gateway consumes this module.

use crate::config::ClientConfig;
use crate::error::{RecoveryError, Result};
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry strategy configuration
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    /// Maximum number of retries
    pub max_retries: usize,
    /// Initial retry delay
    pub initial_delay: Duration,
    /// Maximum retry delay
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
}

impl RetryStrategy {
    /// Create a new retry strategy from client config
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_retries: config.max_read_retries,
            initial_delay: Duration::from_millis(config.retry_initial_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            multiplier: config.retry_multiplier,
        }
    }

    /// Create an exponential backoff instance
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_delay)
            .with_max_interval(self.max_delay)
            .with_multiplier(self.multiplier)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Check if an error is retryable
    pub fn is_retryable(error: &RecoveryError) -> bool {
        match error {
            // Transport-level failures are retryable
            RecoveryError::Network(_) => true,
            // Server-side RPC failures might be transient (5xx)
            RecoveryError::Rpc(msg) => {
                msg.contains("500") || msg.contains("502") || msg.contains("503")
            }
            // A transaction not yet in a block may appear on the next poll
            RecoveryError::TransactionNotFound(_) => true,
            // A garbled response might be a transient proxy artifact
            RecoveryError::InvalidResponse(_) => true,
            // Validation, simulation, and submission outcomes are final
            _ => false,
        }
    }

    /// Execute an operation with retry logic
    pub async fn retry<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.create_backoff();
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!("Attempt {} of {}", attempts, self.max_retries + 1);

            match operation().await {
                Ok(result) => {
                    if attempts > 1 {
                        debug!("Operation succeeded after {} attempts", attempts);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !Self::is_retryable(&error) {
                        warn!("Non-retryable error: {:?}", error);
                        return Err(error);
                    }

                    if attempts > self.max_retries {
                        warn!(
                            "Max retries ({}) exceeded. Last error: {:?}",
                            self.max_retries, error
                        );
                        return Err(RecoveryError::MaxRetriesExceeded(self.max_retries));
                    }

                    let delay = match backoff.next_backoff() {
                        Some(d) => d,
                        None => {
                            warn!("Backoff exhausted");
                            return Err(RecoveryError::MaxRetriesExceeded(self.max_retries));
                        }
                    };

                    warn!(
                        "Attempt {} failed: {:?}. Retrying in {:?}",
                        attempts, error, delay
                    );

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_strategy(max_retries: usize) -> RetryStrategy {
        RetryStrategy {
            max_retries,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_retry_strategy_from_config() {
        let config = ClientConfig::testnet();
        let strategy = RetryStrategy::from_config(&config);
        assert_eq!(strategy.max_retries, config.max_read_retries);
        assert_eq!(
            strategy.initial_delay,
            Duration::from_millis(config.retry_initial_delay_ms)
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(RetryStrategy::is_retryable(
            &RecoveryError::TransactionNotFound("pending".to_string())
        ));
        assert!(RetryStrategy::is_retryable(&RecoveryError::Rpc(
            "HTTP 503: unavailable".to_string()
        )));
        assert!(!RetryStrategy::is_retryable(&RecoveryError::Validation(
            "bad address".to_string()
        )));
        assert!(!RetryStrategy::is_retryable(&RecoveryError::Simulation(
            "would revert".to_string()
        )));
        assert!(!RetryStrategy::is_retryable(&RecoveryError::Submission(
            "reverted".to_string()
        )));
    }

    #[tokio::test]
    async fn test_retry_success_on_first_attempt() {
        let strategy = fast_strategy(3);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = strategy
            .retry(|| async {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                Ok::<i32, RecoveryError>(42)
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_retries() {
        let strategy = fast_strategy(3);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = strategy
            .retry(|| async {
                let count = counter_clone.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(RecoveryError::TransactionNotFound("pending".to_string()))
                } else {
                    Ok::<i32, RecoveryError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_max_retries_exceeded() {
        let strategy = fast_strategy(2);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = strategy
            .retry(|| async {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                Err::<i32, RecoveryError>(RecoveryError::TransactionNotFound(
                    "pending".to_string(),
                ))
            })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            RecoveryError::MaxRetriesExceeded(_)
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 3); // Initial + 2 retries
    }

    #[tokio::test]
    async fn test_retry_non_retryable_error() {
        let strategy = fast_strategy(3);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = strategy
            .retry(|| async {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                Err::<i32, RecoveryError>(RecoveryError::Validation("bad input".to_string()))
            })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            RecoveryError::Validation(_)
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 1); // No retries
    }
}
