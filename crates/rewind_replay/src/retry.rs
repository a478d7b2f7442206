//! Retry executor for live calls.
//!
//! An explicit attempt counter with exponential backoff. Attempt 0 runs
//! immediately; attempt `n` first sleeps `backoff(n)`. Retryable failures
//! consume attempts until `max_retries` extra attempts are spent, permanent
//! failures return at once. The deadline bounds each attempt, not the
//! backoff sleeps between them.

use rewind_core::time::duration_ms;
use rewind_tool::{ExecutionError, ExecutionErrorKind};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Backoff and attempt limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts after the first
    pub max_retries: u32,
    /// Delay unit for the exponential curve
    #[serde(with = "duration_ms")]
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
    /// Growth factor per attempt, clamped to at least 1.0
    pub base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never sleeps
    #[must_use]
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            base: 1.0,
        }
    }

    /// Set the retry limit
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial delay
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the growth factor
    #[must_use]
    pub fn with_base(mut self, base: f64) -> Self {
        self.base = base;
        self
    }

    /// `min(max_delay, initial_delay * base^attempt)`, zero for attempt 0
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base = if self.base.is_finite() {
            self.base.max(1.0)
        } else {
            1.0
        };
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let nanos = self.initial_delay.as_nanos() as f64 * base.powi(exponent);
        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos.round() as u64)
    }

    /// Time budget for one attempt, `None` when unbounded
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        Self::deadline_for(self.max_delay, self.max_retries)
    }

    fn deadline_for(max_delay: Duration, max_retries: u32) -> Option<Duration> {
        max_delay
            .checked_mul(max_retries)
            .filter(|budget| !budget.is_zero())
    }
}

/// Retry classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryClass {
    /// Worth another attempt
    Retryable,
    /// Retrying cannot help
    Permanent,
}

/// Successful call plus the attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    /// Call result
    pub value: T,
    /// Attempts consumed, at least 1
    pub attempts: u32,
}

impl<T> Retried<T> {
    /// Attempts beyond the first
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Last failure after retries ran out or a permanent error was hit
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct RetryExhausted {
    /// Last observed failure
    pub error: ExecutionError,
    /// Attempts consumed
    pub attempts: u32,
}

impl RetryExhausted {
    /// Attempts beyond the first
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Runs live calls under a `RetryPolicy`
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create with a policy
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Active policy
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Classify a failure.
    ///
    /// 429/502/503, timeouts, connection failures, and explicit transients
    /// are retryable. Every other status and explicit permanents are not.
    #[must_use]
    pub fn classify(error: &ExecutionError) -> RetryClass {
        match error.kind {
            ExecutionErrorKind::Status(429 | 502 | 503)
            | ExecutionErrorKind::Timeout
            | ExecutionErrorKind::Connection
            | ExecutionErrorKind::Transient => RetryClass::Retryable,
            ExecutionErrorKind::Status(_) | ExecutionErrorKind::Permanent => {
                RetryClass::Permanent
            }
        }
    }

    /// Backoff before `attempt`
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.policy.backoff(attempt)
    }

    /// Run `operation` with the policy's retry limit
    ///
    /// # Errors
    ///
    /// Returns the last failure once retries are exhausted, a permanent
    /// failure immediately, or a permanent failure if one attempt outlasts
    /// the policy deadline
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<Retried<T>, RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExecutionError>>,
    {
        self.execute_with_limit(operation, self.policy.max_retries)
            .await
    }

    /// Run `operation` allowing up to `max_retries` extra attempts
    ///
    /// # Errors
    ///
    /// Same as [`RetryExecutor::execute`]
    pub async fn execute_with_limit<T, F, Fut>(
        &self,
        mut operation: F,
        max_retries: u32,
    ) -> Result<Retried<T>, RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExecutionError>>,
    {
        let deadline = RetryPolicy::deadline_for(self.policy.max_delay, max_retries);
        let mut attempt = 0;
        loop {
            let delay = self.policy.backoff(attempt);
            if !delay.is_zero() {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
                tokio::time::sleep(delay).await;
            }

            let outcome = match deadline {
                Some(limit) => match tokio::time::timeout(limit, operation()).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        error!(?limit, attempts = attempt + 1, "live call exceeded retry deadline");
                        return Err(RetryExhausted {
                            error: ExecutionError::permanent(format!(
                                "call exceeded retry deadline of {}ms",
                                limit.as_millis()
                            )),
                            attempts: attempt + 1,
                        });
                    }
                },
                None => operation().await,
            };

            match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt, "live call succeeded after retry");
                    }
                    return Ok(Retried {
                        value,
                        attempts: attempt + 1,
                    });
                }
                Err(error) => {
                    if Self::classify(&error) == RetryClass::Permanent {
                        warn!(error = %error, "non-retryable failure");
                        return Err(RetryExhausted {
                            error,
                            attempts: attempt + 1,
                        });
                    }
                    if attempt >= max_retries {
                        error!(attempts = attempt + 1, error = %error, "all retry attempts exhausted");
                        return Err(RetryExhausted {
                            error,
                            attempts: attempt + 1,
                        });
                    }
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = max_retries.saturating_add(1),
                        error = %error,
                        "retryable failure"
                    );
                    attempt += 1;
                }
            }
        }
    }
}
