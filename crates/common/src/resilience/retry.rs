//! Bounded retry with exponential or linear backoff and ratio jitter
//!
//! An operation is attempted up to `max_attempts + 1` times. Before retry
//! number `n` (counted from 0) the executor sleeps for
//!
//! - exponential: `initial_delay * 2^n`
//! - linear: `initial_delay`
//!
//! capped at `max_delay` and then jittered by a uniform factor in
//! `[1 - jitter_ratio, 1 + jitter_ratio]`. A [`RetryPolicy`] decides per error
//! whether retrying makes sense at all; a `Stop` decision rethrows at once.
//!
//! The same delay formula ([`RetryConfig::delay_for`]) drives every other
//! backoff loop in the workspace, so token refresh retries and recovery
//! retries stay consistent with request retries.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::circuit_breaker::{ConfigError, ConfigResult};
use crate::error::ErrorClassification;

/// Terminal failure of a retried operation, annotated with the retry count
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Every permitted attempt failed; carries the last error
    #[error("Operation failed after {retries} retries: {source}")]
    Exhausted {
        #[source]
        source: E,
        retries: u32,
    },

    /// The policy refused to retry this error
    #[error("Operation failed with non-retryable error: {source}")]
    NonRetryable {
        #[source]
        source: E,
        retries: u32,
    },
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Number of retries performed before giving up
    pub const fn retry_count(&self) -> u32 {
        match self {
            Self::Exhausted { retries, .. } | Self::NonRetryable { retries, .. } => *retries,
        }
    }

    /// The last error returned by the operation
    pub const fn last_error(&self) -> &E {
        match self {
            Self::Exhausted { source, .. } | Self::NonRetryable { source, .. } => source,
        }
    }

    /// Consume the error, returning the last operation error
    pub fn into_source(self) -> E {
        match self {
            Self::Exhausted { source, .. } | Self::NonRetryable { source, .. } => source,
        }
    }

    /// Whether the budget ran out (as opposed to a policy stop)
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<RetryOutcome<T>, RetryError<E>>;

/// Successful retry execution: the value plus how many retries it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub retry_count: u32,
    pub total_delay: Duration,
}

impl<T> RetryOutcome<T> {
    /// Consume the outcome and return only the value
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    /// Decide whether to retry after `error` on retry index `attempt`
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation with the configured backoff delay
    Retry,
    /// Retry the operation after a specific delay (still capped at `max_delay`)
    RetryAfter(Duration),
    /// Don't retry the operation
    Stop,
}

/// Growth of the delay between retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// `initial_delay * 2^attempt`
    #[default]
    Exponential,
    /// Constant `initial_delay`
    Linear,
}

impl BackoffStrategy {
    /// Un-jittered delay before retry `attempt`, capped at `max_delay`
    pub fn calculate_delay(self, initial_delay: Duration, max_delay: Duration, attempt: u32) -> Duration {
        let delay = match self {
            Self::Exponential => {
                let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
                initial_delay.checked_mul(factor).unwrap_or(max_delay)
            }
            Self::Linear => initial_delay,
        };
        delay.min(max_delay)
    }
}

/// Symmetric ratio jitter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jitter {
    ratio: f64,
}

impl Jitter {
    /// Jitter of ±`ratio`; non-finite or negative ratios disable jitter
    pub fn ratio(ratio: f64) -> Self {
        let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 };
        Self { ratio }
    }

    /// No jitter
    pub const fn none() -> Self {
        Self { ratio: 0.0 }
    }

    /// Apply jitter using the thread-local RNG
    pub fn apply(self, delay: Duration) -> Duration {
        if self.ratio <= 0.0 {
            return delay;
        }
        let sample = rand::thread_rng().gen_range(-1.0..=1.0);
        self.apply_with_sample(delay, sample)
    }

    /// Apply jitter with an explicit sample in `[-1, 1]`
    pub fn apply_with_sample(self, delay: Duration, sample: f64) -> Duration {
        let factor = 1.0 + self.ratio * sample.clamp(-1.0, 1.0);
        delay.mul_f64(factor.max(0.0))
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries permitted after the first attempt
    pub max_attempts: u32,
    /// Backoff strategy for calculating delays
    pub strategy: BackoffStrategy,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay before jitter
    pub max_delay: Duration,
    /// Jitter applied to each delay, as a fraction of it
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: BackoffStrategy::Exponential,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter_ratio: 0.1,
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.jitter_ratio.is_finite() || !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(ConfigError::Invalid {
                message: format!("jitter_ratio must be within [0, 1], got {}", self.jitter_ratio),
            });
        }

        if self.initial_delay > self.max_delay {
            return Err(ConfigError::Invalid {
                message: "initial_delay must not exceed max_delay".to_string(),
            });
        }

        Ok(())
    }

    /// Jittered delay before retry `attempt` (0 for the first retry)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.strategy.calculate_delay(self.initial_delay, self.max_delay, attempt);
        Jitter::ratio(self.jitter_ratio).apply(delay)
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub const fn exponential(mut self) -> Self {
        self.config.strategy = BackoffStrategy::Exponential;
        self
    }

    pub const fn linear(mut self) -> Self {
        self.config.strategy = BackoffStrategy::Linear;
        self
    }

    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.initial_delay = delay;
        self
    }

    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    pub const fn jitter_ratio(mut self, ratio: f64) -> Self {
        self.config.jitter_ratio = ratio;
        self
    }

    pub const fn no_jitter(mut self) -> Self {
        self.config.jitter_ratio = 0.0;
        self
    }

    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// The main retry executor
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    /// Create a new retry executor with the given configuration and policy
    pub const fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    /// Create with default configuration
    pub fn with_policy(policy: P) -> Self {
        Self::new(RetryConfig::default(), policy)
    }

    /// Default configuration used by [`execute`](Self::execute)
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with the executor's default configuration
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with(&self.config, operation).await
    }

    /// Execute an operation with a per-call configuration
    #[instrument(skip_all, fields(max_attempts = config.max_attempts))]
    pub async fn execute_with<F, Fut, T, E>(
        &self,
        config: &RetryConfig,
        mut operation: F,
    ) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut retries = 0u32;
        let mut total_delay = Duration::ZERO;

        loop {
            let error = match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(retries, "Operation succeeded after retries");
                    }
                    return Ok(RetryOutcome { value, retry_count: retries, total_delay });
                }
                Err(error) => error,
            };

            let decision = self.policy.should_retry(&error, retries);
            if decision == RetryDecision::Stop {
                debug!(retries, error = %error, "Retry policy determined not to retry");
                return Err(RetryError::NonRetryable { source: error, retries });
            }

            if retries >= config.max_attempts {
                warn!(retries, error = %error, "All retry attempts exhausted");
                return Err(RetryError::Exhausted { source: error, retries });
            }

            let delay = match decision {
                RetryDecision::RetryAfter(custom) => custom.min(config.max_delay),
                RetryDecision::Retry | RetryDecision::Stop => config.delay_for(retries),
            };
            warn!(
                attempt = retries + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Operation failed, retrying"
            );
            tokio::time::sleep(delay).await;
            total_delay += delay;
            retries += 1;
        }
    }
}

/// Pre-defined retry policies for common scenarios
pub mod policies {
    use super::{fmt, ErrorClassification, RetryDecision, RetryPolicy};

    /// Always retry policy - retries on any error
    #[derive(Debug, Clone, Copy, Default)]
    pub struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    /// Never retry policy - never retries
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NeverRetry;

    impl<E> RetryPolicy<E> for NeverRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Stop
        }
    }

    /// Retries whatever [`ErrorClassification::is_retryable`] accepts,
    /// honouring `retry_after` hints
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ClassifiedRetry;

    impl<E: ErrorClassification> RetryPolicy<E> for ClassifiedRetry {
        fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
            if !error.is_retryable() {
                return RetryDecision::Stop;
            }
            error.retry_after().map_or(RetryDecision::Retry, RetryDecision::RetryAfter)
        }
    }

    /// Predicate-based retry policy
    pub struct PredicateRetry<F> {
        predicate: F,
    }

    impl<F> fmt::Debug for PredicateRetry<F> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("PredicateRetry").finish_non_exhaustive()
        }
    }

    impl<F> PredicateRetry<F> {
        pub const fn new(predicate: F) -> Self {
            Self { predicate }
        }
    }

    impl<F, E> RetryPolicy<E> for PredicateRetry<F>
    where
        F: Fn(&E, u32) -> bool,
    {
        fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision {
            if (self.predicate)(error, attempt) {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }
}
