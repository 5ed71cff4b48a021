//! Recovery orchestrator - coordinates multi-strategy auth recovery
//!
//! One pass runs the strategies in [`RecoveryStrategy::ALL`] order and stops
//! at the first that yields a session. Passes are single-flight: a trigger
//! arriving while a pass runs is skipped, whatever its source (token refresh
//! exhaustion, facade auth failures, the health monitor).
//!
//! The orchestrator keeps its own gate, separate from the request circuit
//! breaker: after `circuit_breaker_threshold` consecutive failed passes it
//! refuses new passes until `cooldown_ms` has elapsed. Failed passes below the
//! threshold schedule a retry with the shared backoff formula.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use unimoghub_common::{
    BackoffStrategy, CommonError, CommonResult, EventBus, RetryConfig, SharedClock, TimerSlot,
};
use unimoghub_domain::constants::REASON_API_KEY_INVALID;
use unimoghub_domain::{
    BackendConfig, ConnectivityConfig, ConnectivityEvent, RecoveryPhase, RecoverySettings,
    RecoveryStats, RecoveryStrategy, Session, SessionBackup, StorageSettings,
};

use super::strategies::{StrategyRunner, Verdict};
use crate::auth::ports::AuthClient;
use crate::credential_ports::CredentialStore;

/// Capacity of the recovered-session broadcast
const SESSION_CHANNEL_CAPACITY: usize = 16;

type PendingOperation = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Result of [`RecoveryOrchestrator::initiate_recovery`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// A strategy produced a usable session
    Recovered { strategy: RecoveryStrategy, session: Session },
    /// Every strategy failed
    Failed { attempt: u32, circuit_open: bool },
    /// No pass was run
    Skipped(SkipReason),
    /// The state was reset while the pass ran; its result was discarded
    Superseded,
}

impl RecoveryOutcome {
    pub const fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered { .. })
    }
}

/// Why a recovery trigger did not start a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyRecovering,
    CircuitOpen { retry_after: Duration },
}

#[derive(Debug)]
struct RecoveryState {
    recovering: bool,
    /// Bumped by every reset; a pass only reports into its own generation
    generation: u64,
    attempt_count: u32,
    /// Monotonic and wall-clock time the gate opened
    circuit_opened_at: Option<(Instant, i64)>,
    success_count: u64,
    failure_count: u64,
    last_attempt_ms: Option<i64>,
    environment_check_passed: bool,
}

impl RecoveryState {
    const fn fresh(environment_check_passed: bool) -> Self {
        Self {
            recovering: false,
            generation: 0,
            attempt_count: 0,
            circuit_opened_at: None,
            success_count: 0,
            failure_count: 0,
            last_attempt_ms: None,
            environment_check_passed,
        }
    }

    const fn phase(&self) -> RecoveryPhase {
        if self.recovering {
            RecoveryPhase::Recovering
        } else if self.circuit_opened_at.is_some() {
            RecoveryPhase::CircuitOpen
        } else {
            RecoveryPhase::Idle
        }
    }
}

/// Releases the single-flight flag if a pass is dropped mid-way
struct PassGuard<'a> {
    state: &'a Mutex<RecoveryState>,
    armed: bool,
}

impl PassGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.lock().recovering = false;
            warn!("Recovery pass abandoned before completion");
        }
    }
}

/// Multi-strategy auth recovery
pub struct RecoveryOrchestrator {
    settings: RecoverySettings,
    storage: StorageSettings,
    backend: BackendConfig,
    auth: Arc<dyn AuthClient>,
    store: Arc<dyn CredentialStore>,
    clock: SharedClock,
    events: EventBus<ConnectivityEvent>,
    sessions: broadcast::Sender<Session>,
    backoff: RetryConfig,
    state: Mutex<RecoveryState>,
    pending: Mutex<VecDeque<PendingOperation>>,
    draining: AtomicBool,
    retry_timer: TimerSlot,
    monitor_timer: TimerSlot,
    /// Background passes and drains, aborted on shutdown
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for RecoveryOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryOrchestrator").field("stats", &self.stats()).finish_non_exhaustive()
    }
}

impl RecoveryOrchestrator {
    /// Create an orchestrator in the IDLE phase
    pub fn new(
        config: &ConnectivityConfig,
        auth: Arc<dyn AuthClient>,
        store: Arc<dyn CredentialStore>,
        clock: SharedClock,
        events: EventBus<ConnectivityEvent>,
    ) -> Arc<Self> {
        let settings = config.recovery.clone();
        let backoff = RetryConfig {
            max_attempts: settings.circuit_breaker_threshold,
            strategy: BackoffStrategy::Exponential,
            initial_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter_ratio: settings.jitter_ratio,
        };
        let environment_ok = config.backend.check_shape().is_ok();
        let (sessions, _) = broadcast::channel(SESSION_CHANNEL_CAPACITY);

        Arc::new(Self {
            settings,
            storage: config.storage.clone(),
            backend: config.backend.clone(),
            auth,
            store,
            clock,
            events,
            sessions,
            backoff,
            state: Mutex::new(RecoveryState::fresh(environment_ok)),
            pending: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            retry_timer: TimerSlot::new("recovery_retry"),
            monitor_timer: TimerSlot::new("recovery_monitor"),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Run one recovery pass unless the gate or single-flight forbids it
    #[instrument(skip(self))]
    pub async fn initiate_recovery(self: &Arc<Self>, reason: &str) -> RecoveryOutcome {
        let (attempt, generation) = match self.begin_pass() {
            Ok(started) => started,
            Err(skip) => {
                debug!(?skip, "Recovery trigger skipped");
                return RecoveryOutcome::Skipped(skip);
            }
        };
        let mut guard = PassGuard { state: &self.state, armed: true };

        self.retry_timer.cancel();
        info!(attempt, "Auth recovery started");
        self.events.publish(ConnectivityEvent::RecoveryStarted { reason: reason.to_string(), attempt });

        let recovered = self.run_strategies().await;
        guard.disarm();

        match recovered {
            Some((strategy, session)) => self.complete_pass(reason, attempt, generation, strategy, session),
            None => self.fail_pass(reason, attempt, generation),
        }
    }

    /// Run a pass in the background; the task is aborted by [`Self::shutdown`]
    pub fn spawn_recovery(self: &Arc<Self>, reason: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(reason, "No runtime to start recovery on");
            return;
        };
        let orchestrator = Arc::clone(self);
        let reason = reason.to_string();
        self.track(runtime.spawn(async move {
            orchestrator.initiate_recovery(&reason).await;
        }));
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    fn begin_pass(&self) -> Result<(u32, u64), SkipReason> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if let Some((opened_at, _)) = state.circuit_opened_at {
            let cooldown = Duration::from_millis(self.settings.cooldown_ms);
            let elapsed = now.saturating_duration_since(opened_at);
            if elapsed < cooldown {
                return Err(SkipReason::CircuitOpen { retry_after: cooldown - elapsed });
            }
            info!("Recovery gate cooldown elapsed, closing gate");
            state.circuit_opened_at = None;
            state.attempt_count = 0;
        }

        if state.recovering {
            return Err(SkipReason::AlreadyRecovering);
        }

        state.recovering = true;
        state.attempt_count += 1;
        state.last_attempt_ms = Some(self.clock.millis_since_epoch());
        Ok((state.attempt_count, state.generation))
    }

    /// Release the single-flight flag; false if a reset superseded the pass
    fn finish_pass(&self, generation: u64, update: impl FnOnce(&mut RecoveryState)) -> bool {
        let mut state = self.state.lock();
        state.recovering = false;
        if state.generation != generation {
            return false;
        }
        update(&mut state);
        true
    }

    async fn run_strategies(&self) -> Option<(RecoveryStrategy, Session)> {
        let runner = StrategyRunner {
            auth: &*self.auth,
            store: &*self.store,
            clock: &*self.clock,
            backend: &self.backend,
            storage: &self.storage,
            settle_delay: Duration::from_millis(self.settings.settle_delay_ms),
        };

        for strategy in RecoveryStrategy::ALL {
            match runner.run(strategy).await {
                Ok(Verdict::Recovered(session)) => {
                    info!(strategy = %strategy, "Recovery strategy succeeded");
                    return Some((strategy, session));
                }
                Ok(Verdict::EnvironmentChecked(passed)) => {
                    self.state.lock().environment_check_passed = passed;
                }
                Ok(Verdict::Unrecovered) => {
                    debug!(strategy = %strategy, "Recovery strategy did not recover a session");
                }
                Err(err) => {
                    warn!(strategy = %strategy, error = %err, "Recovery strategy failed");
                }
            }
        }

        None
    }

    fn complete_pass(
        self: &Arc<Self>,
        reason: &str,
        attempt: u32,
        generation: u64,
        strategy: RecoveryStrategy,
        session: Session,
    ) -> RecoveryOutcome {
        let recorded = self.finish_pass(generation, |state| {
            state.attempt_count = 0;
            state.success_count += 1;
        });
        if !recorded {
            warn!(attempt, strategy = %strategy, "Recovery state reset during the pass, result discarded");
            return RecoveryOutcome::Superseded;
        }

        let session = session.anchored(self.clock.millis_since_epoch());
        if self.sessions.send(session.clone()).is_err() {
            debug!("No listeners for the recovered session");
        }

        info!(attempt, strategy = %strategy, "Auth recovery completed");
        metrics::counter!("unimoghub_recovery_passes_total", "outcome" => "recovered").increment(1);
        self.events.publish(ConnectivityEvent::RecoveryCompleted {
            reason: reason.to_string(),
            strategy,
            attempts: attempt,
        });
        self.spawn_drain();

        RecoveryOutcome::Recovered { strategy, session }
    }

    fn fail_pass(self: &Arc<Self>, reason: &str, attempt: u32, generation: u64) -> RecoveryOutcome {
        let circuit_open = attempt >= self.settings.circuit_breaker_threshold;
        let opened_at = (self.clock.now(), self.clock.millis_since_epoch());
        let recorded = self.finish_pass(generation, |state| {
            state.failure_count += 1;
            if circuit_open {
                state.circuit_opened_at = Some(opened_at);
            }
        });
        if !recorded {
            warn!(attempt, "Recovery state reset during the pass, result discarded");
            return RecoveryOutcome::Superseded;
        }

        metrics::counter!("unimoghub_recovery_passes_total", "outcome" => "failed").increment(1);
        self.events.publish(ConnectivityEvent::RecoveryFailed {
            reason: reason.to_string(),
            attempt,
            circuit_open,
        });

        if circuit_open {
            error!(attempts = attempt, "Recovery gate opened after max attempts");
            self.events.publish(ConnectivityEvent::CircuitBreakerOpened {
                attempts: attempt,
                cooldown_ms: self.settings.cooldown_ms,
            });
        } else {
            let delay = self.backoff.delay_for(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Auth recovery failed, retry scheduled");
            let orchestrator = Arc::downgrade(self);
            let reason = reason.to_string();
            self.retry_timer.schedule(delay, move || Self::retry_task(orchestrator, reason));
        }

        RecoveryOutcome::Failed { attempt, circuit_open }
    }

    fn retry_task(orchestrator: Weak<Self>, reason: String) -> BoxFuture<'static, ()> {
        async move {
            if let Some(orchestrator) = orchestrator.upgrade() {
                orchestrator.initiate_recovery(&reason).await;
            }
        }
        .boxed()
    }

    /// Defer `operation` until auth is healthy
    ///
    /// Runs immediately (in the background) when no recovery is active.
    /// Operation failures are logged, never returned.
    pub fn queue_operation<F, Fut>(self: &Arc<Self>, operation: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let queued = {
            let mut pending = self.pending.lock();
            pending.push_back(Box::new(move || operation().boxed()));
            pending.len()
        };

        let phase = self.phase();
        debug!(queued, phase = %phase, "Operation deferred");
        if phase == RecoveryPhase::Idle {
            self.spawn_drain();
        }
    }

    fn spawn_drain(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime to drain deferred operations, keeping them queued");
            return;
        };
        let orchestrator = Arc::clone(self);
        self.track(runtime.spawn(async move {
            orchestrator.drain_pending().await;
        }));
    }

    /// Run queued operations in FIFO order; returns how many ran
    async fn drain_pending(&self) -> usize {
        let mut ran = 0usize;

        loop {
            if self.draining.swap(true, Ordering::AcqRel) {
                return ran;
            }

            loop {
                if self.state.lock().recovering {
                    break;
                }
                let next = self.pending.lock().pop_front();
                let Some(operation) = next else {
                    break;
                };
                if let Err(err) = operation().await {
                    warn!(error = %err, "Deferred operation failed");
                }
                ran += 1;
            }

            self.draining.store(false, Ordering::Release);

            // An operation may have been queued after the last pop
            let queued = !self.pending.lock().is_empty();
            let recovering = self.state.lock().recovering;
            if !queued || recovering {
                break;
            }
        }

        if ran > 0 {
            info!(ran, "Deferred operations drained");
        }
        ran
    }

    /// Drop every queued operation without running it
    pub fn discard_pending(&self) -> usize {
        let mut pending = self.pending.lock();
        let discarded = pending.len();
        pending.clear();
        discarded
    }

    /// Store `session` in the backup slot outside the credential namespace
    pub async fn backup_session(&self, session: &Session) -> CommonResult<()> {
        let now_ms = self.clock.millis_since_epoch();
        let backup = SessionBackup { session: session.clone().anchored(now_ms), backed_up_at_ms: now_ms };
        let raw = backup
            .to_json()
            .map_err(|err| CommonError::serialization_format("json", err.to_string()))?;
        self.store.set(&self.storage.backup_key, &raw).await?;
        debug!("Session backed up");
        Ok(())
    }

    /// Clear counters and the gate and cancel any scheduled retry
    ///
    /// A pass still running keeps the single-flight flag until it returns,
    /// but its result is discarded.
    pub fn reset_recovery_state(&self) {
        self.retry_timer.cancel();
        let environment_ok = self.backend.check_shape().is_ok();
        let mut state = self.state.lock();
        let mut fresh = RecoveryState::fresh(environment_ok);
        fresh.recovering = state.recovering;
        fresh.generation = state.generation.wrapping_add(1);
        *state = fresh;
        info!(pass_running = state.recovering, "Recovery state reset");
    }

    /// Start the periodic auth health check
    pub fn start_monitoring(self: &Arc<Self>) {
        if !self.settings.monitoring_enabled {
            debug!("Auth monitoring disabled");
            return;
        }

        let period = Duration::from_millis(self.settings.health_check_interval_ms);
        let orchestrator = Arc::downgrade(self);
        self.monitor_timer
            .schedule_recurring(period, move || Self::health_task(orchestrator.clone()));
        info!(interval_ms = self.settings.health_check_interval_ms, "Auth monitoring started");
    }

    pub fn stop_monitoring(&self) {
        if self.monitor_timer.cancel() {
            info!("Auth monitoring stopped");
        }
    }

    fn health_task(orchestrator: Weak<Self>) -> BoxFuture<'static, ()> {
        async move {
            if let Some(orchestrator) = orchestrator.upgrade() {
                orchestrator.health_check().await;
            }
        }
        .boxed()
    }

    /// Probe the session while IDLE; an auth failure starts recovery
    pub async fn health_check(self: &Arc<Self>) {
        let phase = self.phase();
        if phase != RecoveryPhase::Idle {
            debug!(phase = %phase, "Auth health check skipped");
            return;
        }

        match self.auth.get_session().await {
            Ok(_) => debug!("Auth health check passed"),
            Err(err) if err.kind().requires_recovery() => {
                warn!(error = %err, "Auth health check failed, starting recovery");
                self.initiate_recovery(REASON_API_KEY_INVALID).await;
            }
            Err(err) => debug!(error = %err, "Auth health check inconclusive"),
        }
    }

    /// Sessions produced by successful passes
    pub fn subscribe_sessions(&self) -> broadcast::Receiver<Session> {
        self.sessions.subscribe()
    }

    pub fn phase(&self) -> RecoveryPhase {
        self.state.lock().phase()
    }

    pub fn is_recovering(&self) -> bool {
        self.state.lock().recovering
    }

    pub fn stats(&self) -> RecoveryStats {
        let pending_operations = self.pending.lock().len();
        let state = self.state.lock();
        RecoveryStats {
            phase: state.phase(),
            attempt_count: state.attempt_count,
            success_count: state.success_count,
            failure_count: state.failure_count,
            last_attempt_ms: state.last_attempt_ms,
            circuit_opened_at_ms: state.circuit_opened_at.map(|(_, millis)| millis),
            environment_check_passed: state.environment_check_passed,
            pending_operations,
            retry_scheduled: self.retry_timer.is_active(),
        }
    }

    /// Cancel the timers and abort background passes and drains
    pub fn shutdown(&self) {
        self.retry_timer.cancel();
        self.monitor_timer.cancel();
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        debug!(tasks = tasks.len(), "Recovery orchestrator shut down");
    }
}
