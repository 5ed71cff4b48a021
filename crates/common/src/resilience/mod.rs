//! Resilience patterns for remote calls
//!
//! - **Circuit Breaker**: stops calling a backend that keeps failing and
//!   admits a single trial call after a cooldown
//! - **Retry Logic**: bounded retries with exponential or linear backoff and
//!   ratio jitter
//!
//! Both are generic over the operation's error type. Layer specific errors
//! plug into retry decisions through [`policies::ClassifiedRetry`], which
//! reads [`ErrorClassification`](crate::error::ErrorClassification).
//!
//! The usual composition puts the breaker outside the retry loop, so one
//! logical request counts as a single breaker failure no matter how many
//! times it was retried:
//!
//! ```no_run
//! use unimoghub_common::resilience::{policies::AlwaysRetry, CircuitBreaker, CircuitBreakerConfig, RetryExecutor};
//!
//! # async fn run() {
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig::default()).unwrap();
//! let retry = RetryExecutor::with_policy(AlwaysRetry);
//!
//! let result = breaker
//!     .call(|| retry.execute(|| async { Ok::<_, std::io::Error>("pong") }))
//!     .await;
//! # let _ = result;
//! # }
//! ```

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerMetrics,
    CircuitState, ConfigError, ConfigResult, ResilienceError, ResilienceResult,
};
pub use retry::{
    policies, BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError,
    RetryExecutor, RetryOutcome, RetryPolicy, RetryResult,
};
