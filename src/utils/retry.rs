//! Retry utilities with exponential backoff for resilient API calls.

use std::time::Duration;
use tokio::time::sleep;

use crate::config::RetryConfig;
use crate::sources::SourceError;

/// Which errors are worth another attempt
pub type ErrorClassifier = fn(&SourceError) -> bool;

/// Retry policy: a classification predicate, an attempt bound and an
/// exponential backoff schedule.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Errors matching this predicate are retried, all others propagate
    pub is_transient: ErrorClassifier,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Build a policy that retries 400 Bad Request responses
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            is_transient: SourceError::is_bad_request,
        }
    }

    /// Replace the classification predicate
    pub fn with_classifier(mut self, is_transient: ErrorClassifier) -> Self {
        self.is_transient = is_transient;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// Saturates at [`Duration::MAX`] when the backoff overflows or the
    /// multiplier is not a usable number.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Every wait the policy can schedule before giving up
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|attempt| self.delay_for(attempt)).collect()
    }
}

/// Execute an async operation with retry logic
///
/// Transient errors are retried after the policy's backoff delay until
/// `max_attempts` is reached, at which point
/// [`SourceError::RetriesExhausted`] is returned. Any other error is
/// returned immediately.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceError>>,
{
    let mut attempts = 0;
    let mut operation = operation;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    tracing::info!(
                        "Operation succeeded on attempt {} after {} transient failures",
                        attempts,
                        attempts - 1
                    );
                }
                return Ok(result);
            }
            Err(error) if (policy.is_transient)(&error) => {
                if attempts >= policy.max_attempts {
                    tracing::error!("Operation failed after {} attempts: {}", attempts, error);
                    return Err(SourceError::RetriesExhausted {
                        attempts,
                        last: Box::new(error),
                    });
                }

                let delay = policy.delay_for(attempts);
                tracing::warn!(
                    "{}, retrying in {:.1} sec... (attempt {})",
                    error,
                    delay.as_secs_f64(),
                    attempts
                );
                sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}
