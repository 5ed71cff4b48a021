//! Circuit breaker for fault-tolerant remote calls
//!
//! The breaker counts failures of the wrapped operation. Once
//! `failure_threshold` failures accumulate it opens and rejects calls without
//! running them. After `timeout` has elapsed the next caller becomes the
//! single half-open trial: its success closes the circuit, its failure opens
//! it again and restarts the cooldown. While the trial is in flight every
//! other caller is rejected with [`ResilienceError::CircuitOpen`].
//!
//! All state transitions happen under one mutex, so concurrent callers always
//! observe a consistent `(state, failure_count, opened_at, trial)` tuple.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::time::{Clock, SystemClock};

//==============================================================================
// Error Types
//==============================================================================

/// Simple configuration error for validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Errors produced by a circuit-breaker-protected call
///
/// Generic over the underlying operation error type `E`, preserving the
/// original error for the caller.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Circuit breaker is open, rejecting calls
    #[error("Circuit breaker is open, rejecting calls")]
    CircuitOpen {
        /// Remaining cooldown before a trial call is admitted
        retry_after: Duration,
    },

    /// The underlying operation failed
    #[error("Operation failed: {source}")]
    OperationFailed {
        #[source]
        source: E,
    },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Whether the call was rejected without running the operation
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Underlying operation error, if the operation ran
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::OperationFailed { source } => Some(source),
            Self::CircuitOpen { .. } => None,
        }
    }
}

/// Result type for resilience operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

/// Configuration result type using simple config errors
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit admits a single trial request to probe recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit
    pub failure_threshold: u64,
    /// Cooldown before an open circuit admits a trial call
    pub timeout: Duration,
    /// Whether a success while closed clears the failure count
    pub reset_on_success: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, timeout: Duration::from_secs(60), reset_on_success: true }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                message: "timeout must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub const fn failure_threshold(mut self, threshold: u64) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub const fn reset_on_success(mut self, reset: bool) -> Self {
        self.config.reset_on_success = reset;
        self
    }

    /// Set a custom clock for the circuit breaker (useful for testing)
    pub fn clock<C: Clock>(self, clock: C) -> CircuitBreakerBuilderWithClock<C> {
        CircuitBreakerBuilderWithClock { config: self.config, clock }
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Builder with custom clock that builds a CircuitBreaker directly
#[derive(Debug)]
pub struct CircuitBreakerBuilderWithClock<C: Clock> {
    config: CircuitBreakerConfig,
    clock: C,
}

impl<C: Clock> CircuitBreakerBuilderWithClock<C> {
    pub const fn failure_threshold(mut self, threshold: u64) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreaker<C>> {
        CircuitBreaker::with_clock(self.config, self.clock)
    }
}

/// Circuit breaker metrics for monitoring
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub failure_count: u64,
    pub total_calls: u64,
    pub total_failures: u64,
    pub rejected_calls: u64,
    pub last_failure_time: Option<Instant>,
    pub state_change_time: Instant,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u64,
    opened_at: Option<Instant>,
    last_failure_time: Option<Instant>,
    state_change_time: Instant,
    trial_in_flight: bool,
}

impl BreakerInner {
    fn transition(&mut self, state: CircuitState, now: Instant) {
        self.state = state;
        self.state_change_time = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permit {
    Normal,
    Trial,
}

/// Releases a half-open trial slot if the call future is dropped mid-flight
struct TrialGuard<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    armed: bool,
}

impl<C: Clock> TrialGuard<'_, C> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<C: Clock> Drop for TrialGuard<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.inner.lock().trial_in_flight = false;
            debug!("half-open trial abandoned, slot released");
        }
    }
}

/// Generic circuit breaker implementation
///
/// Cheap to clone; clones share state.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerInner>>,
    total_calls: Arc<AtomicU64>,
    total_failures: Arc<AtomicU64>,
    rejected_calls: Arc<AtomicU64>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("failure_count", &inner.failure_count)
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
            total_calls: Arc::clone(&self.total_calls),
            total_failures: Arc::clone(&self.total_failures),
            rejected_calls: Arc::clone(&self.rejected_calls),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker with the given configuration using system
    /// clock
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a circuit breaker using the builder pattern
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a new circuit breaker with a custom clock (useful for testing)
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        let now = clock.now();

        Ok(Self {
            config,
            inner: Arc::new(Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
                last_failure_time: None,
                state_change_time: now,
                trial_in_flight: false,
            })),
            total_calls: Arc::new(AtomicU64::new(0)),
            total_failures: Arc::new(AtomicU64::new(0)),
            rejected_calls: Arc::new(AtomicU64::new(0)),
            clock: Arc::new(clock),
        })
    }

    /// The configuration this breaker was built with
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Non-mutating check whether a call would currently be admitted
    pub fn is_available(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => !inner.trial_in_flight,
            CircuitState::Open => self.remaining_cooldown(&inner).is_zero(),
        }
    }

    fn remaining_cooldown(&self, inner: &BreakerInner) -> Duration {
        let Some(opened_at) = inner.opened_at else {
            return Duration::ZERO;
        };
        let elapsed = self.clock.now().saturating_duration_since(opened_at);
        self.config.timeout.saturating_sub(elapsed)
    }

    fn try_acquire(&self) -> Result<Permit, Duration> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::Normal),
            CircuitState::Open => {
                let remaining = self.remaining_cooldown(&inner);
                if !remaining.is_zero() {
                    return Err(remaining);
                }
                inner.transition(CircuitState::HalfOpen, self.clock.now());
                inner.trial_in_flight = true;
                info!("Circuit breaker half-open, admitting trial call");
                Ok(Permit::Trial)
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(Duration::ZERO)
                } else {
                    inner.trial_in_flight = true;
                    Ok(Permit::Trial)
                }
            }
        }
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// Rejected calls never invoke `operation`.
    #[instrument(skip(self, operation), fields(state = %self.state()))]
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let permit = match self.try_acquire() {
            Ok(permit) => permit,
            Err(retry_after) => {
                self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                debug!(retry_after_ms = retry_after.as_millis() as u64, "Circuit breaker rejecting call");
                return Err(ResilienceError::CircuitOpen { retry_after });
            }
        };

        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let mut guard = TrialGuard { breaker: self, armed: permit == Permit::Trial };

        match operation().await {
            Ok(result) => {
                guard.disarm();
                self.record_success(permit);
                Ok(result)
            }
            Err(error) => {
                guard.disarm();
                self.record_failure(permit);
                debug!(%error, "Circuit breaker: operation failed");
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    fn record_success(&self, permit: Permit) {
        let mut inner = self.inner.lock();
        match (inner.state, permit) {
            (CircuitState::HalfOpen, Permit::Trial) => {
                inner.transition(CircuitState::Closed, self.clock.now());
                inner.failure_count = 0;
                inner.opened_at = None;
                inner.trial_in_flight = false;
                info!("Circuit breaker closed after successful trial");
            }
            (CircuitState::Closed, _) => {
                if self.config.reset_on_success {
                    inner.failure_count = 0;
                }
            }
            // A call admitted while closed finished after the circuit opened
            _ => {}
        }
    }

    fn record_failure(&self, permit: Permit) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure_time = Some(now);

        match (inner.state, permit) {
            (CircuitState::Closed, _) if inner.failure_count >= self.config.failure_threshold => {
                inner.transition(CircuitState::Open, now);
                inner.opened_at = Some(now);
                warn!(failures = inner.failure_count, "Circuit breaker opened");
            }
            (CircuitState::HalfOpen, Permit::Trial) => {
                inner.transition(CircuitState::Open, now);
                inner.opened_at = Some(now);
                inner.trial_in_flight = false;
                warn!("Circuit breaker re-opened after failed trial");
            }
            _ => {}
        }
    }

    /// Get the current state of the circuit breaker
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Remaining cooldown while open, zero otherwise
    pub fn retry_after(&self) -> Duration {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Open => self.remaining_cooldown(&inner),
            CircuitState::Closed | CircuitState::HalfOpen => Duration::ZERO,
        }
    }

    /// Get circuit breaker metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        CircuitBreakerMetrics {
            state: inner.state,
            failure_count: inner.failure_count,
            total_calls: self.total_calls.load(Ordering::Acquire),
            total_failures: self.total_failures.load(Ordering::Acquire),
            rejected_calls: self.rejected_calls.load(Ordering::Acquire),
            last_failure_time: inner.last_failure_time,
            state_change_time: inner.state_change_time,
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.transition(CircuitState::Closed, now);
        inner.failure_count = 0;
        inner.opened_at = None;
        inner.last_failure_time = None;
        inner.trial_in_flight = false;
        info!("Circuit breaker manually reset to closed state");
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the circuit breaker
    //!
    //! Tests cover state transitions, configuration validation, the single
    //! half-open trial, cooldown timing via `MockClock`, and abandoned trials.

    use std::sync::atomic::AtomicU32;

    use tokio::sync::Notify;

    use super::*;
    use crate::time::MockClock;

    #[derive(Debug, Error)]
    #[error("test failure")]
    struct TestError;

    fn breaker(threshold: u64, timeout: Duration) -> (CircuitBreaker<MockClock>, MockClock) {
        let clock = MockClock::new();
        let breaker = CircuitBreaker::builder()
            .clock(clock.clone())
            .failure_threshold(threshold)
            .timeout(timeout)
            .build()
            .expect("valid config");
        (breaker, clock)
    }

    async fn fail(breaker: &CircuitBreaker<MockClock>) -> ResilienceResult<(), TestError> {
        breaker.call(|| async { Err::<(), _>(TestError) }).await
    }

    async fn succeed(breaker: &CircuitBreaker<MockClock>) -> ResilienceResult<u32, TestError> {
        breaker.call(|| async { Ok::<_, TestError>(7) }).await
    }

    // =========================================================================
    // Configuration Tests
    // =========================================================================

    /// Validates `CircuitBreakerConfig::validate` for invalid values.
    ///
    /// Assertions:
    /// - Ensures a zero threshold is rejected.
    /// - Ensures a zero timeout is rejected.
    #[test]
    fn test_config_validation() {
        assert!(CircuitBreakerConfig::builder().failure_threshold(0).build().is_err());
        assert!(CircuitBreakerConfig::builder().timeout(Duration::ZERO).build().is_err());

        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    // =========================================================================
    // State Transition Tests
    // =========================================================================

    /// Validates the open-after-threshold scenario.
    ///
    /// Assertions:
    /// - Confirms the state is `Open` after `threshold` failures.
    /// - Confirms the next call is rejected without invoking the operation.
    #[tokio::test]
    async fn test_opens_after_threshold_and_fails_fast() {
        let (breaker, _clock) = breaker(3, Duration::from_secs(30));

        for _ in 0..3 {
            assert!(matches!(fail(&breaker).await, Err(ResilienceError::OperationFailed { .. })));
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let invoked = AtomicU32::new(0);
        let result = breaker
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(())
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::CircuitOpen { retry_after }) if retry_after == Duration::from_secs(30)));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.metrics().rejected_calls, 1);
    }

    /// Validates that a success while closed clears the failure count.
    ///
    /// Assertions:
    /// - Confirms interleaved successes keep the circuit closed.
    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let (breaker, _clock) = breaker(2, Duration::from_secs(30));

        let _ = fail(&breaker).await;
        assert!(succeed(&breaker).await.is_ok());
        let _ = fail(&breaker).await;

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().failure_count, 1);
    }

    /// Validates the successful half-open trial scenario.
    ///
    /// Assertions:
    /// - Confirms calls are rejected until the cooldown elapses.
    /// - Confirms a successful trial closes the circuit with zero failures.
    #[tokio::test]
    async fn test_half_open_trial_success_closes() {
        let (breaker, clock) = breaker(1, Duration::from_secs(10));

        let _ = fail(&breaker).await;
        clock.advance(Duration::from_secs(9));
        assert!(succeed(&breaker).await.is_err());
        assert!(!breaker.is_available());

        clock.advance(Duration::from_secs(1));
        assert!(breaker.is_available());
        assert_eq!(succeed(&breaker).await.ok(), Some(7));

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().failure_count, 0);
    }

    /// Validates the failed half-open trial scenario.
    ///
    /// Assertions:
    /// - Confirms a failed trial re-opens the circuit.
    /// - Confirms the cooldown restarts from the trial failure.
    #[tokio::test]
    async fn test_half_open_trial_failure_reopens() {
        let (breaker, clock) = breaker(1, Duration::from_secs(10));

        let _ = fail(&breaker).await;
        clock.advance(Duration::from_secs(10));
        assert!(matches!(fail(&breaker).await, Err(ResilienceError::OperationFailed { .. })));

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.retry_after(), Duration::from_secs(10));

        clock.advance(Duration::from_secs(5));
        assert!(matches!(succeed(&breaker).await, Err(ResilienceError::CircuitOpen { .. })));
    }

    /// Validates that concurrent callers fail fast during a trial.
    ///
    /// Assertions:
    /// - Confirms a second caller is rejected while the trial is pending.
    /// - Confirms the trial result still closes the circuit.
    #[tokio::test]
    async fn test_concurrent_callers_rejected_during_trial() {
        let (breaker, clock) = breaker(1, Duration::from_secs(1));
        let _ = fail(&breaker).await;
        clock.advance(Duration::from_secs(1));

        let release = Arc::new(Notify::new());
        let trial_breaker = breaker.clone();
        let trial_release = Arc::clone(&release);
        let trial = tokio::spawn(async move {
            trial_breaker
                .call(|| async move {
                    trial_release.notified().await;
                    Ok::<_, TestError>(1)
                })
                .await
        });

        while breaker.state() != CircuitState::HalfOpen {
            tokio::task::yield_now().await;
        }

        assert!(matches!(succeed(&breaker).await, Err(ResilienceError::CircuitOpen { .. })));

        release.notify_one();
        assert_eq!(trial.await.expect("trial task").ok(), Some(1));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    /// Validates that an abandoned trial releases its slot.
    ///
    /// Assertions:
    /// - Confirms a dropped trial future lets the next caller become the trial.
    #[tokio::test]
    async fn test_dropped_trial_releases_slot() {
        let (breaker, clock) = breaker(1, Duration::from_secs(1));
        let _ = fail(&breaker).await;
        clock.advance(Duration::from_secs(1));

        {
            let pending = breaker.call(|| std::future::pending::<Result<(), TestError>>());
            let mut pending = Box::pin(pending);
            assert!(futures::poll!(pending.as_mut()).is_pending());
        }

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(succeed(&breaker).await.ok(), Some(7));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    /// Validates `CircuitBreaker::reset` behavior.
    ///
    /// Assertions:
    /// - Confirms reset closes an open circuit immediately.
    #[tokio::test]
    async fn test_reset() {
        let (breaker, _clock) = breaker(1, Duration::from_secs(60));
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(succeed(&breaker).await.is_ok());
        let metrics = breaker.metrics();
        assert_eq!(metrics.total_calls, 2);
        assert_eq!(metrics.total_failures, 1);
    }

    /// Validates `CircuitState` display strings.
    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
    }
}
