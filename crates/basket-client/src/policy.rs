//! Retry and timeout policy wrapped around every basket call.

use std::future::Future;
use std::time::Duration;

use basket_service::{Code, Status};
use tokio::time::Instant;

use crate::error::{ClientError, Result};
use crate::observer::{BasketEvent, BasketObserver};

/// Bounded retry with per-attempt and overall timeouts.
///
/// Only transport-level failures (`Unavailable`, `DeadlineExceeded`) are
/// retried; every other status is returned on first sight. Dropping the
/// future returned by [`ResiliencePolicy::execute`] cancels the in-flight
/// attempt and any pending retry.
#[derive(Debug, Clone)]
pub struct ResiliencePolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Deadline for a single attempt.
    pub attempt_timeout: Duration,
    /// Deadline for the whole call, retries and backoff included.
    pub total_timeout: Duration,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
    /// Upper bound for the backoff delay.
    pub max_delay: Duration,
}

impl Default for ResiliencePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(2),
            total_timeout: Duration::from_secs(5),
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl ResiliencePolicy {
    /// Creates a policy with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy that makes a single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set the maximum number of attempts
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the per-attempt timeout
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Set the overall timeout
    #[must_use]
    pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = timeout;
        self
    }

    /// Set the backoff delays
    #[must_use]
    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn is_retryable(status: &Status) -> bool {
        matches!(status.code, Code::Unavailable | Code::DeadlineExceeded)
    }

    /// Runs `call` under the policy.
    ///
    /// Returns [`ClientError::TimedOut`] when the overall deadline passes or
    /// the last attempt timed out, and [`ClientError::Rpc`] for any other
    /// final failure.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &'static str,
        observer: &dyn BasketObserver,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, Status>>,
    {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        let attempts_loop = async {
            loop {
                attempts += 1;
                let outcome = match tokio::time::timeout(self.attempt_timeout, call()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(Status::deadline_exceeded(format!(
                        "{operation} attempt {attempts} exceeded {:?}",
                        self.attempt_timeout
                    ))),
                };

                match outcome {
                    Ok(value) => return Ok(value),
                    Err(status) if Self::is_retryable(&status) && attempts < self.max_attempts => {
                        let delay = self.backoff(attempts);
                        observer.on_event(&BasketEvent::RetryScheduled {
                            operation,
                            attempt: attempts,
                            delay,
                            code: status.code,
                        });
                        tokio::time::sleep(delay).await;
                    }
                    Err(status) => return Err(status),
                }
            }
        };

        let outcome = tokio::time::timeout(self.total_timeout, attempts_loop).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(status)) if status.code == Code::DeadlineExceeded => {
                Err(ClientError::TimedOut { attempts, elapsed })
            }
            Ok(Err(status)) => Err(ClientError::Rpc(status)),
            Err(_) => Err(ClientError::TimedOut { attempts, elapsed }),
        }
    }
}
