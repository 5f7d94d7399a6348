//! Retry with a fixed pause for external API calls
//!
//! The reply poster uses [`RetryConfig::for_posting`]: three attempts, a fixed
//! one-second pause between them, or the server's `Retry-After` when rate limited.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt)
    pub max_retries: u32,

    /// Pause between attempts
    pub pause: Duration,

    /// Upper bound on a server-requested wait
    pub max_wait: Duration,
}

impl RetryConfig {
    /// Same pause between every attempt
    pub fn fixed(max_retries: u32, pause: Duration) -> Self {
        Self {
            max_retries,
            pause,
            max_wait: pause,
        }
    }

    /// Three attempts, one second apart; a rate-limited create may wait up to a minute
    pub fn for_posting() -> Self {
        Self::fixed(2, Duration::from_secs(1)).with_max_wait(Duration::from_secs(60))
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait.max(self.pause);
        self
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Wait before the next attempt
    pub fn backoff(&self, decision: RetryDecision) -> Duration {
        match decision {
            RetryDecision::RetryAfter(wait) => wait.min(self.max_wait),
            _ => self.pause,
        }
    }
}

/// Retry classification for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation
    Retry,
    /// Retry after a specific duration (e.g., from Retry-After header)
    RetryAfter(Duration),
    /// Don't retry, the error is permanent
    NoRetry,
}

/// Trait for errors that can indicate whether to retry
pub trait RetryableError {
    /// Determine if this error should be retried
    fn retry_decision(&self) -> RetryDecision;
}

/// Execute an async operation with retry logic
///
/// Sleeps only between attempts; the last error is returned once the budget is
/// spent or the error is classified as permanent.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let decision = e.retry_decision();

                match decision {
                    RetryDecision::NoRetry => {
                        debug!(
                            operation = operation_name,
                            attempt = attempt,
                            "Operation failed with non-retryable error: {}",
                            e
                        );
                        return Err(e);
                    }
                    RetryDecision::Retry | RetryDecision::RetryAfter(_) => {
                        if attempt >= config.max_retries {
                            warn!(
                                operation = operation_name,
                                attempts = attempt + 1,
                                "Operation failed after {} attempts: {}",
                                attempt + 1,
                                e
                            );
                            return Err(e);
                        }

                        let backoff = config.backoff(decision);

                        warn!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            max_attempts = config.max_attempts(),
                            backoff_secs = backoff.as_secs_f64(),
                            "Retrying after error: {}",
                            e
                        );

                        sleep(backoff).await;
                        attempt += 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posting_pause_is_fixed() {
        let config = RetryConfig::for_posting();
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.backoff(RetryDecision::Retry), Duration::from_secs(1));
    }

    #[test]
    fn test_server_wait_is_capped() {
        let config = RetryConfig::for_posting();
        assert_eq!(
            config.backoff(RetryDecision::RetryAfter(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            config.backoff(RetryDecision::RetryAfter(Duration::from_secs(3600))),
            Duration::from_secs(60)
        );
    }

    #[derive(Debug)]
    struct TestError {
        decision: RetryDecision,
    }

    impl TestError {
        fn transient() -> Self {
            Self {
                decision: RetryDecision::Retry,
            }
        }

        fn permanent() -> Self {
            Self {
                decision: RetryDecision::NoRetry,
            }
        }
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError({:?})", self.decision)
        }
    }

    impl RetryableError for TestError {
        fn retry_decision(&self) -> RetryDecision {
            self.decision
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_gives_up_after_three_attempts() {
        let config = RetryConfig::for_posting();
        let start = tokio::time::Instant::now();
        let mut attempts = 0;

        let result: Result<(), TestError> = with_retry(&config, "test", || {
            attempts += 1;
            async move { Err(TestError::transient()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 3);
        // Two one-second pauses between three attempts
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let config = RetryConfig::for_posting();
        let mut attempts = 0;

        let result: Result<&str, TestError> = with_retry(&config, "test", || {
            attempts += 1;
            let current = attempts;
            async move {
                if current < 3 {
                    Err(TestError::transient())
                } else {
                    Ok("posted")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "posted");
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_no_retry_on_permanent_error() {
        let config = RetryConfig::for_posting();
        let mut attempts = 0;

        let result: Result<&str, TestError> = with_retry(&config, "test", || {
            attempts += 1;
            async move { Err(TestError::permanent()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_as_told() {
        let config = RetryConfig::for_posting();
        let start = tokio::time::Instant::now();
        let mut attempts = 0;

        let result: Result<(), TestError> = with_retry(&config, "test", || {
            attempts += 1;
            let current = attempts;
            async move {
                if current == 1 {
                    Err(TestError {
                        decision: RetryDecision::RetryAfter(Duration::from_secs(30)),
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts, 2);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(30) && elapsed < Duration::from_secs(31));
    }
}
