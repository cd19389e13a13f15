//! Async retry with exponential backoff.
//!
//! Wraps any fallible async operation. The operation is attempted up to
//! `max_attempts` times; after failed attempt `i` (0-based) the loop sleeps
//! `initial_backoff * multiplier^i`, except after the final attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

/// Configuration for retry behavior.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Backoff after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound for a single backoff.
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% jitter to each backoff.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: false,
        }
    }
}

impl RetryConfig {
    /// Exponential schedule with the given attempt budget and base unit.
    pub fn exponential(max_attempts: u32, unit: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff: unit,
            ..Default::default()
        }
    }

    /// Calculate backoff duration after the given failed attempt.
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let backoff =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let backoff_ms = backoff.min(self.max_backoff.as_millis() as f64) as u64;

        let mut duration = Duration::from_millis(backoff_ms);

        if self.add_jitter {
            let jitter = (backoff_ms as f64 * 0.25 * rand_jitter()) as u64;
            duration += Duration::from_millis(jitter);
        }

        duration
    }

    /// Sum of all backoffs a fully failing operation would wait.
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.backoff_duration(attempt))
            .sum()
    }
}

/// Simple pseudo-random jitter (0.0 to 1.0) without external dependencies.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Classifies an error as worth another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Terminal outcome of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last_error: E,
    },

    #[error("{operation} failed with a permanent error: {error}")]
    Permanent {
        operation: String,
        attempts: u32,
        error: E,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Permanent { attempts, .. } => {
                *attempts
            }
        }
    }

    /// The error returned by the last attempt.
    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Permanent { error, .. } => error,
        }
    }
}

/// Execute an async operation with retry logic.
///
/// The closure receives the 0-based attempt index.
///
/// # Example
/// ```ignore
/// let text = retry_async(&RetryConfig::default(), "generate_content", |_attempt| async {
///     provider.generate(&request).await
/// })
/// .await?;
/// ```
pub async fn retry_async<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    let mut waited = Duration::ZERO;

    loop {
        match f(attempt).await {
            Ok(result) => {
                if attempt > 0 {
                    info!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        waited_ms = waited.as_millis() as u64,
                        "Call succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if !error.is_retryable() {
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        error = %error,
                        "Call failed with permanent error, not retrying"
                    );
                    return Err(RetryError::Permanent {
                        operation: operation_name.to_string(),
                        attempts: attempt + 1,
                        error,
                    });
                }

                if attempt + 1 >= max_attempts {
                    warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        waited_ms = waited.as_millis() as u64,
                        error = %error,
                        "Call failed after max attempts"
                    );
                    return Err(RetryError::Exhausted {
                        operation: operation_name.to_string(),
                        attempts: attempt + 1,
                        last_error: error,
                    });
                }

                let backoff = config.backoff_duration(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    error = %error,
                    backoff_ms = backoff.as_millis() as u64,
                    "Call failed, retrying after backoff"
                );

                sleep(backoff).await;
                waited += backoff;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        retryable: bool,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (retryable: {})", self.retryable)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_backoff, Duration::from_secs(1));
        assert!(!config.add_jitter);
    }

    #[test]
    fn test_backoff_duration() {
        let config = RetryConfig::exponential(3, Duration::from_millis(100));

        assert_eq!(config.backoff_duration(0), Duration::from_millis(100));
        assert_eq!(config.backoff_duration(1), Duration::from_millis(200));
        assert_eq!(config.backoff_duration(2), Duration::from_millis(400));
        assert_eq!(config.total_backoff(), Duration::from_millis(300));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_backoff: Duration::from_millis(250),
            ..RetryConfig::exponential(5, Duration::from_millis(100))
        };
        assert_eq!(config.backoff_duration(4), Duration::from_millis(250));
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let config = RetryConfig {
            add_jitter: true,
            ..RetryConfig::exponential(3, Duration::from_millis(1000))
        };
        let backoff = config.backoff_duration(0);
        assert!(backoff >= Duration::from_millis(1000));
        assert!(backoff <= Duration::from_millis(1250));
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let config = RetryConfig::default();
        let result = retry_async(&config, "test_op", |_| async { Ok::<_, TestError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_waits_one_plus_two_units() {
        let config = RetryConfig::exponential(3, Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result = retry_async(&config, "test_op", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(TestError { retryable: true }) }
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_on_second_attempt() {
        let config = RetryConfig::exponential(3, Duration::from_secs(1));
        let start = tokio::time::Instant::now();

        let result = retry_async(&config, "test_op", |attempt| async move {
            if attempt == 0 {
                Err(TestError { retryable: true })
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let config = RetryConfig::exponential(3, Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        let result = retry_async(&config, "test_op", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(TestError { retryable: false }) }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts(), 1);
        assert!(!err.last_error().retryable);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
