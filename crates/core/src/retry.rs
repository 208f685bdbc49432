//! Retry mechanism with bounded exponential backoff
//!
//! Transient failures (network errors, timeouts, 5xx responses) are retried
//! up to a fixed number of attempts; permanent failures are returned at once.

use std::future::Future;
use std::time::Duration;

use crate::error::{Classification, Error, Result};

/// Immutable retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy, validating its parameters
    ///
    /// # Errors
    /// Returns [`Error::Config`] if `max_attempts` is zero or the multiplier
    /// is below 1 (or not finite).
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        backoff_multiplier: f64,
        max_delay: Duration,
    ) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        if !backoff_multiplier.is_finite() || backoff_multiplier < 1.0 {
            return Err(Error::Config(format!(
                "backoff_multiplier must be >= 1, got {backoff_multiplier}"
            )));
        }
        Ok(Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
            max_delay,
        })
    }

    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay to wait before attempt `attempt` (1-indexed).
    ///
    /// Zero for the first attempt, then
    /// `min(initial_delay * multiplier^(attempt - 2), max_delay)`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let max_secs = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= max_secs {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Retry policy builder for easy customization
#[derive(Debug, Clone)]
pub struct RetryBuilder {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
    max_delay: Duration,
}

impl RetryBuilder {
    pub fn new() -> Self {
        let defaults = RetryPolicy::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_delay: defaults.initial_delay,
            backoff_multiplier: defaults.backoff_multiplier,
            max_delay: defaults.max_delay,
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn build(self) -> Result<RetryPolicy> {
        RetryPolicy::new(
            self.max_attempts,
            self.initial_delay,
            self.backoff_multiplier,
            self.max_delay,
        )
    }
}

impl Default for RetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a retried operation together with the number of attempts made
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

impl<T> Attempted<T> {
    pub fn into_result(self) -> Result<T> {
        self.result
    }
}

/// Runs fallible async operations under a [`RetryPolicy`]
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent.
    ///
    /// Permanent errors are returned unchanged. When every attempt failed
    /// transiently, the last error is wrapped in [`Error::RetryExhausted`].
    ///
    /// # Example
    /// ```ignore
    /// let outcome = executor
    ///     .run(|| async { store.get_object(key).await }, classify_error)
    ///     .await;
    /// ```
    pub async fn run<T, F, Fut, C>(&self, mut operation: F, classify: C) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: Fn(&Error) -> Classification,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match operation().await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(e) => e,
            };

            if classify(&error) == Classification::Permanent {
                return Attempted {
                    result: Err(error),
                    attempts: attempt,
                };
            }

            if attempt >= self.policy.max_attempts {
                return Attempted {
                    result: Err(Error::RetryExhausted {
                        attempts: attempt,
                        source: Box::new(error),
                    }),
                    attempts: attempt,
                };
            }

            let backoff = self.policy.delay_before(attempt + 1);
            tracing::debug!(
                attempt = attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "Retrying after transient error"
            );

            tokio::time::sleep(backoff).await;
        }
    }

    /// Like [`RetryExecutor::run`], discarding the attempt count
    pub async fn execute<T, F, Fut, C>(&self, operation: F, classify: C) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: Fn(&Error) -> Classification,
    {
        self.run(operation, classify).await.result
    }
}

/// Default classifier: network, timeout and transient I/O errors are retried
pub fn classify_error(error: &Error) -> Classification {
    error.classify()
}
