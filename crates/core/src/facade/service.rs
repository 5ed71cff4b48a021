//! Connectivity facade - entry point for domain data access
//!
//! Each call runs `breaker.call(|| retry.execute(raw_call))`: the breaker
//! sees one logical request however many retries it took, and an open
//! circuit rejects the request before any attempt is made.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};
use unimoghub_common::resilience::policies::ClassifiedRetry;
use unimoghub_common::{
    BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState,
    ResilienceError, RetryConfig, RetryError, RetryExecutor, SharedClock,
};
use unimoghub_domain::constants::REASON_AUTH_EXPIRED;
use unimoghub_domain::{
    BackoffKind, ConnectivityConfig, MetricCategory, MetricRecord, Mutation, MutationOptions,
    QueryOptions, QuerySpec, RetryOverrides, RetrySettings,
};

use super::history::MetricsHistory;
use super::ports::ResourceClient;
use crate::error::{ConnectivityError, ConnectivityResult};
use crate::recovery::RecoveryOrchestrator;

/// Successful facade call
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T> {
    pub data: T,
    pub retry_count: u32,
    pub latency_ms: u64,
}

/// Result of [`ConnectivityFacade::health_check`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub healthy: bool,
    pub latency_ms: u64,
    pub circuit_state: CircuitState,
}

/// Resilient access to backend resources
pub struct ConnectivityFacade {
    client: Arc<dyn ResourceClient>,
    breaker: CircuitBreaker<SharedClock>,
    retry: RetryExecutor<ClassifiedRetry>,
    health_resource: String,
    history: MetricsHistory,
    recovery: Option<Arc<RecoveryOrchestrator>>,
    clock: SharedClock,
}

impl fmt::Debug for ConnectivityFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityFacade")
            .field("breaker", &self.breaker)
            .field("retry", self.retry.config())
            .field("health_resource", &self.health_resource)
            .finish_non_exhaustive()
    }
}

impl ConnectivityFacade {
    /// Build the facade from configuration
    pub fn new(
        config: &ConnectivityConfig,
        client: Arc<dyn ResourceClient>,
        clock: SharedClock,
    ) -> anyhow::Result<Self> {
        let breaker_config = CircuitBreakerConfig::builder()
            .failure_threshold(config.circuit_breaker.failure_threshold)
            .timeout(Duration::from_millis(config.circuit_breaker.cooldown_ms))
            .build()?;
        let breaker = CircuitBreaker::with_clock(breaker_config, Arc::clone(&clock))?;

        let retry_config = retry_config_from(&config.retry);
        retry_config.validate()?;

        Ok(Self {
            client,
            breaker,
            retry: RetryExecutor::new(retry_config, ClassifiedRetry),
            health_resource: config.backend.health_resource.clone(),
            history: MetricsHistory::new(config.metrics.history_capacity),
            recovery: None,
            clock,
        })
    }

    /// Route auth-expired failures to `recovery`
    #[must_use]
    pub fn with_recovery(mut self, recovery: Arc<RecoveryOrchestrator>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Read `resource`
    pub async fn query(&self, resource: &str, options: &QueryOptions) -> ConnectivityResult<Response<Value>> {
        let query = options.to_spec();
        let retry_config = self.retry_config_for(options.retry.as_ref());
        let client = &*self.client;
        let query = &query;

        self.run(resource, MetricCategory::Query, "select", &retry_config, || async move {
            client.select(resource, query).await.map_err(ConnectivityError::from_remote)
        })
        .await
    }

    /// Write to `resource`
    pub async fn mutate(
        &self,
        resource: &str,
        mutation: &Mutation,
        options: &MutationOptions,
    ) -> ConnectivityResult<Response<Value>> {
        let retry_config = self.retry_config_for(options.retry.as_ref());
        let client = &*self.client;

        self.run(resource, MetricCategory::Mutation, mutation.kind().as_str(), &retry_config, || async move {
            client.mutate(resource, mutation).await.map_err(ConnectivityError::from_remote)
        })
        .await
    }

    async fn run<F, Fut>(
        &self,
        resource: &str,
        category: MetricCategory,
        operation: &str,
        retry_config: &RetryConfig,
        attempt: F,
    ) -> ConnectivityResult<Response<Value>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ConnectivityResult<Value>>,
    {
        let started = self.clock.now();
        let retry = &self.retry;
        let result = self.breaker.call(move || retry.execute_with(retry_config, attempt)).await;
        let latency_ms = u64::try_from(self.clock.now().saturating_duration_since(started).as_millis()).unwrap_or(u64::MAX);

        let result = match result {
            Ok(outcome) => Ok(Response { data: outcome.value, retry_count: outcome.retry_count, latency_ms }),
            Err(ResilienceError::CircuitOpen { retry_after }) => Err(ConnectivityError::circuit_open(retry_after)),
            Err(ResilienceError::OperationFailed { source }) => Err(unwrap_retry_error(source)),
        };

        self.history.record(
            category,
            MetricRecord {
                resource: resource.to_string(),
                operation: operation.to_string(),
                latency_ms,
                success: result.is_ok(),
                retry_count: match &result {
                    Ok(response) => response.retry_count,
                    Err(err) => err.retry_count,
                },
                timestamp_ms: self.clock.millis_since_epoch(),
                error_kind: result.as_ref().err().map(|err| err.kind),
            },
        );

        match &result {
            Ok(response) => {
                debug!(resource, operation, latency_ms, retry_count = response.retry_count, "Request succeeded");
            }
            Err(err) => {
                warn!(resource, operation, latency_ms, kind = %err.kind, retry_count = err.retry_count, error = %err, "Request failed");
                if err.is_auth_expired() {
                    self.trigger_recovery();
                }
            }
        }

        result
    }

    fn trigger_recovery(&self) {
        if let Some(recovery) = &self.recovery {
            recovery.spawn_recovery(REASON_AUTH_EXPIRED);
        }
    }

    fn retry_config_for(&self, overrides: Option<&RetryOverrides>) -> RetryConfig {
        let mut config = self.retry.config().clone();
        if let Some(overrides) = overrides {
            if let Some(max_attempts) = overrides.max_attempts {
                config.max_attempts = max_attempts;
            }
            if let Some(backoff) = overrides.backoff {
                config.strategy = backoff_strategy(backoff);
            }
            if let Some(initial_delay_ms) = overrides.initial_delay_ms {
                config.initial_delay = Duration::from_millis(initial_delay_ms).min(config.max_delay);
            }
        }
        config
    }

    /// One minimal read outside the breaker
    pub async fn health_check(&self) -> HealthReport {
        let query = QuerySpec { columns: vec!["id".to_string()], limit: Some(1), ..QuerySpec::default() };
        let started = self.clock.now();
        let result = self.client.select(&self.health_resource, &query).await;
        let latency_ms = u64::try_from(self.clock.now().saturating_duration_since(started).as_millis()).unwrap_or(u64::MAX);

        if let Err(err) = &result {
            warn!(resource = %self.health_resource, error = %err, "Health check failed");
        }

        HealthReport { healthy: result.is_ok(), latency_ms, circuit_state: self.breaker.state() }
    }

    /// History for one category, or every category
    pub fn get_metrics(&self, category: Option<MetricCategory>) -> Vec<MetricRecord> {
        match category {
            Some(category) => self.history.get(category),
            None => self.history.all(),
        }
    }

    pub fn clear_metrics(&self) {
        self.history.clear();
    }

    pub fn reset_circuit_breaker(&self) {
        self.breaker.reset();
        info!("Request circuit breaker reset");
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn circuit_metrics(&self) -> CircuitBreakerMetrics {
        self.breaker.metrics()
    }
}

fn unwrap_retry_error(error: RetryError<ConnectivityError>) -> ConnectivityError {
    let retries = error.retry_count();
    error.into_source().with_retry_count(retries)
}

const fn backoff_strategy(kind: BackoffKind) -> BackoffStrategy {
    match kind {
        BackoffKind::Exponential => BackoffStrategy::Exponential,
        BackoffKind::Linear => BackoffStrategy::Linear,
    }
}

fn retry_config_from(settings: &RetrySettings) -> RetryConfig {
    RetryConfig {
        max_attempts: settings.max_attempts,
        strategy: backoff_strategy(settings.backoff),
        initial_delay: Duration::from_millis(settings.initial_delay_ms),
        max_delay: Duration::from_millis(settings.max_delay_ms),
        jitter_ratio: settings.jitter_ratio,
    }
}
