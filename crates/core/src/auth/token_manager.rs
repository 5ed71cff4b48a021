//! Token lifecycle manager
//!
//! Keeps the held session fresh without user involvement:
//!
//! - a proactive one-shot timer refreshes `refresh_buffer_minutes` before
//!   expiry (immediately if that moment has passed)
//! - failed refreshes retry with exponential backoff up to
//!   `max_refresh_attempts`, then hand over to the recovery orchestrator
//! - an independent fallback timer re-triggers refresh if the proactive path
//!   has gone quiet
//!
//! Only one refresh cycle (first attempt plus its retries) is in flight at a
//! time. [`TokenLifecycleManager::ensure_fresh`] attaches to a running cycle
//! and resolves with its final result.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use unimoghub_common::{BackoffStrategy, EventBus, RetryConfig, SharedClock, TimerSlot};
use unimoghub_domain::constants::{REASON_API_KEY_INVALID, REASON_TOKEN_REFRESH_FAILED};
use unimoghub_domain::{
    AuthEvent, AuthStateChange, ConnectivityEvent, RemoteError, Session, TokenSettings,
    TokenSnapshot, TokenStatus,
};

use super::ports::AuthClient;
use crate::recovery::RecoveryOrchestrator;

/// Where an ingested session came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionSource {
    /// Notification, initial read or recovery
    Established,
    /// Result of a refresh, ours or the client's
    Refreshed,
}

/// Final result of one refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CycleReport {
    generation: u64,
    succeeded: bool,
}

#[derive(Debug, Default)]
struct TokenState {
    session: Option<Session>,
    expires_at_ms: Option<i64>,
    last_refresh_ms: Option<i64>,
    refresh_attempts: u32,
    is_refreshing: bool,
    /// Incremented when a refresh cycle starts
    generation: u64,
    next_refresh_ms: Option<i64>,
}

/// Proactive, retried and fallback token refresh
pub struct TokenLifecycleManager {
    settings: TokenSettings,
    auth: Arc<dyn AuthClient>,
    recovery: Arc<RecoveryOrchestrator>,
    events: EventBus<ConnectivityEvent>,
    clock: SharedClock,
    backoff: RetryConfig,
    state: Mutex<TokenState>,
    cycles: watch::Sender<CycleReport>,
    refresh_timer: TimerSlot,
    retry_timer: TimerSlot,
    fallback_timer: TimerSlot,
    session_listener: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for TokenLifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenLifecycleManager").field("snapshot", &self.snapshot()).finish_non_exhaustive()
    }
}

impl TokenLifecycleManager {
    /// Create a manager holding no session
    pub fn new(
        settings: TokenSettings,
        auth: Arc<dyn AuthClient>,
        recovery: Arc<RecoveryOrchestrator>,
        events: EventBus<ConnectivityEvent>,
        clock: SharedClock,
    ) -> Arc<Self> {
        let backoff = RetryConfig {
            max_attempts: settings.max_refresh_attempts,
            strategy: BackoffStrategy::Exponential,
            initial_delay: Duration::from_millis(settings.retry_base_delay_ms),
            max_delay: Duration::from_millis(settings.retry_max_delay_ms),
            jitter_ratio: 0.0,
        };
        let (cycles, _) = watch::channel(CycleReport { generation: 0, succeeded: false });

        Arc::new(Self {
            settings,
            auth,
            recovery,
            events,
            clock,
            backoff,
            state: Mutex::new(TokenState::default()),
            cycles,
            refresh_timer: TimerSlot::new("token_refresh"),
            retry_timer: TimerSlot::new("token_refresh_retry"),
            fallback_timer: TimerSlot::new("token_fallback"),
            session_listener: Mutex::new(None),
        })
    }

    /// Read the current session, start the fallback timer and adopt
    /// sessions produced by recovery
    #[instrument(skip(self))]
    pub async fn initialize(self: &Arc<Self>) {
        self.listen_for_recovered_sessions();

        match self.auth.get_session().await {
            Ok(Some(session)) => self.ingest(session, SessionSource::Established).await,
            Ok(None) => info!("No existing session"),
            Err(err) if err.kind().requires_recovery() => {
                warn!(error = %err, "Stored credentials rejected, starting recovery");
                self.recovery.initiate_recovery(REASON_API_KEY_INVALID).await;
            }
            Err(err) => warn!(error = %err, "Failed to read the current session"),
        }

        self.start_fallback_timer();
    }

    fn listen_for_recovered_sessions(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime for the recovered-session listener");
            return;
        };

        let mut sessions = self.recovery.subscribe_sessions();
        let manager = Arc::downgrade(self);
        let listener = runtime.spawn(async move {
            loop {
                match sessions.recv().await {
                    Ok(session) => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        info!("Adopting session produced by recovery");
                        manager.ingest(session, SessionSource::Established).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Recovered-session listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        if let Some(previous) = self.session_listener.lock().replace(listener) {
            previous.abort();
        }
    }

    /// Apply an auth notification from the backend client
    pub async fn handle_auth_event(self: &Arc<Self>, change: AuthStateChange) {
        match (change.event, change.session) {
            (event, Some(session)) if event.establishes_session() => {
                let source = if event == AuthEvent::TokenRefreshed {
                    SessionSource::Refreshed
                } else {
                    SessionSource::Established
                };
                self.ingest(session, source).await;
            }
            (AuthEvent::SignedOut, _) => self.clear(),
            (event, _) => debug!(event = %event, "Auth event ignored"),
        }
    }

    async fn ingest(self: &Arc<Self>, session: Session, source: SessionSource) {
        let now_ms = self.clock.millis_since_epoch();
        let session = session.anchored(now_ms);
        let expires_at_ms = session.expires_at_ms(now_ms);
        let backup = session.clone();

        {
            let mut state = self.state.lock();
            state.session = Some(session);
            state.expires_at_ms = expires_at_ms;
            state.last_refresh_ms = Some(now_ms);
            state.refresh_attempts = 0;
        }

        // A session arriving from elsewhere ends a cycle waiting on its retry
        if source == SessionSource::Established && self.retry_timer.cancel() {
            self.finish_cycle(true);
        }

        if let Err(err) = self.recovery.backup_session(&backup).await {
            warn!(error = %err, "Failed to back up session");
        }

        info!(expires_at_ms, "Token state updated");
        self.events.publish(ConnectivityEvent::TokenUpdated { expires_at_ms });
        self.schedule_proactive_refresh(expires_at_ms, now_ms, source);
    }

    fn schedule_proactive_refresh(
        self: &Arc<Self>,
        expires_at_ms: Option<i64>,
        now_ms: i64,
        source: SessionSource,
    ) {
        let Some(expires_at_ms) = expires_at_ms else {
            debug!("Session has no expiry, proactive refresh not scheduled");
            self.refresh_timer.cancel();
            self.state.lock().next_refresh_ms = None;
            return;
        };

        let buffer_ms = i64::try_from(self.settings.refresh_buffer_minutes.saturating_mul(60_000)).unwrap_or(i64::MAX);
        let mut delay_ms = expires_at_ms.saturating_sub(buffer_ms).saturating_sub(now_ms).max(0);
        if source == SessionSource::Refreshed {
            let floor = i64::try_from(self.settings.min_refresh_delay_ms).unwrap_or(i64::MAX);
            delay_ms = delay_ms.max(floor);
        }

        self.state.lock().next_refresh_ms = Some(now_ms.saturating_add(delay_ms));
        if delay_ms == 0 {
            info!("Token inside refresh buffer, refreshing now");
        } else {
            debug!(delay_ms, "Proactive refresh scheduled");
        }

        let manager = Arc::downgrade(self);
        let delay = Duration::from_millis(u64::try_from(delay_ms).unwrap_or_default());
        self.refresh_timer.schedule(delay, move || Self::proactive_task(manager));
    }

    fn proactive_task(manager: Weak<Self>) -> BoxFuture<'static, ()> {
        async move {
            if let Some(manager) = manager.upgrade() {
                manager.refresh_token().await;
            }
        }
        .boxed()
    }

    /// Start a refresh cycle
    ///
    /// Returns `false` without any network call when a cycle is already in
    /// flight. Otherwise returns whether the first attempt succeeded; failed
    /// attempts keep retrying in the background.
    pub async fn refresh_token(self: &Arc<Self>) -> bool {
        let (attempt, generation) = {
            let mut state = self.state.lock();
            if state.is_refreshing {
                debug!("Refresh already in progress");
                return false;
            }
            state.is_refreshing = true;
            state.generation += 1;
            state.refresh_attempts += 1;
            (state.refresh_attempts, state.generation)
        };

        self.run_refresh_attempt(attempt, generation).await
    }

    /// Start a fresh cycle with the attempt counter reset
    pub async fn force_refresh(self: &Arc<Self>) -> bool {
        info!("Force refresh requested");
        {
            let mut state = self.state.lock();
            if !state.is_refreshing {
                state.refresh_attempts = 0;
            }
        }
        self.refresh_token().await
    }

    async fn run_refresh_attempt(self: &Arc<Self>, attempt: u32, generation: u64) -> bool {
        self.events.publish(ConnectivityEvent::RefreshStarted { attempt });
        info!(attempt, "Refreshing authentication token");

        let error = match self.auth.refresh_session().await {
            Ok(Some(session)) => {
                self.ingest(session, SessionSource::Refreshed).await;
                let expires_at_ms = self.state.lock().expires_at_ms;
                self.finish_cycle(true);
                metrics::counter!("unimoghub_token_refreshes_total", "outcome" => "success").increment(1);
                info!(generation, expires_at_ms, "Token refresh successful");
                self.events.publish(ConnectivityEvent::RefreshCompleted { expires_at_ms });
                return true;
            }
            Ok(None) => RemoteError::new("No session returned after refresh"),
            Err(err) => err,
        };

        self.handle_refresh_failure(attempt, &error);
        false
    }

    fn handle_refresh_failure(self: &Arc<Self>, attempt: u32, error: &RemoteError) {
        let kind = error.kind();
        let will_retry = attempt < self.settings.max_refresh_attempts;
        metrics::counter!("unimoghub_token_refreshes_total", "outcome" => "failure").increment(1);
        error!(attempt, kind = %kind, error = %error, "Token refresh failed");
        self.events.publish(ConnectivityEvent::RefreshFailed {
            attempt,
            kind,
            message: error.message.clone(),
            will_retry,
        });

        if will_retry {
            let delay = self.backoff.delay_for(attempt);
            info!(next_attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Scheduling token refresh retry");
            let manager = Arc::downgrade(self);
            self.retry_timer.schedule(delay, move || Self::retry_task(manager));
            return;
        }

        error!(attempts = attempt, "Max refresh attempts reached, triggering recovery");
        self.state.lock().refresh_attempts = 0;
        self.finish_cycle(false);

        self.recovery.spawn_recovery(REASON_TOKEN_REFRESH_FAILED);
    }

    fn retry_task(manager: Weak<Self>) -> BoxFuture<'static, ()> {
        async move {
            if let Some(manager) = manager.upgrade() {
                manager.retry_refresh().await;
            }
        }
        .boxed()
    }

    async fn retry_refresh(self: &Arc<Self>) {
        let next = {
            let mut state = self.state.lock();
            if state.is_refreshing {
                state.refresh_attempts += 1;
                Some((state.refresh_attempts, state.generation))
            } else {
                None
            }
        };

        match next {
            Some((attempt, generation)) => {
                self.run_refresh_attempt(attempt, generation).await;
            }
            None => debug!("Refresh cycle ended before its retry fired"),
        }
    }

    /// Close the in-flight cycle, waking `ensure_fresh` waiters
    fn finish_cycle(&self, succeeded: bool) {
        let generation = {
            let mut state = self.state.lock();
            if !state.is_refreshing {
                return;
            }
            state.is_refreshing = false;
            state.generation
        };
        self.cycles.send_replace(CycleReport { generation, succeeded });
    }

    /// Make sure a live token is held, refreshing if necessary
    ///
    /// Attaches to an in-flight cycle instead of starting a second one. The
    /// result is the cycle's final outcome, after any retries.
    pub async fn ensure_fresh(self: &Arc<Self>) -> bool {
        let mut reports = self.cycles.subscribe();

        let in_flight = {
            let state = self.state.lock();
            state.is_refreshing.then_some(state.generation)
        };

        let generation = match in_flight {
            Some(generation) => generation,
            None => {
                if !self.refresh_due() {
                    return true;
                }
                if self.refresh_token().await {
                    return true;
                }
                let state = self.state.lock();
                if !state.is_refreshing {
                    return false;
                }
                state.generation
            }
        };

        debug!(generation, "Waiting for in-flight refresh");
        let succeeded = reports
            .wait_for(|report| report.generation >= generation)
            .await
            .map(|report| report.succeeded);
        succeeded.unwrap_or(false)
    }

    /// No token, or the token is inside the refresh buffer
    fn refresh_due(&self) -> bool {
        let state = self.state.lock();
        if state.session.is_none() {
            return true;
        }
        let buffer_ms = i64::try_from(self.settings.refresh_buffer_minutes.saturating_mul(60_000)).unwrap_or(i64::MAX);
        state
            .expires_at_ms
            .is_some_and(|expires_at| expires_at.saturating_sub(buffer_ms) <= self.clock.millis_since_epoch())
    }

    fn start_fallback_timer(self: &Arc<Self>) {
        let period = Duration::from_millis(self.settings.fallback_interval_ms);
        let manager = Arc::downgrade(self);
        self.fallback_timer.schedule_recurring(period, move || Self::fallback_task(manager.clone()));
        debug!(interval_ms = self.settings.fallback_interval_ms, "Fallback refresh timer started");
    }

    fn fallback_task(manager: Weak<Self>) -> BoxFuture<'static, ()> {
        async move {
            if let Some(manager) = manager.upgrade() {
                manager.fallback_refresh().await;
            }
        }
        .boxed()
    }

    async fn fallback_refresh(self: &Arc<Self>) {
        let due = {
            let state = self.state.lock();
            let spacing = i64::try_from(self.settings.fallback_min_spacing_ms).unwrap_or(i64::MAX);
            let now_ms = self.clock.millis_since_epoch();
            state.session.is_some()
                && !state.is_refreshing
                && state.last_refresh_ms.map_or(true, |last| now_ms.saturating_sub(last) >= spacing)
        };

        if due {
            info!("Fallback refresh triggered");
            self.refresh_token().await;
        } else {
            debug!("Fallback refresh skipped");
        }
    }

    /// Token present and valid for at least the safety buffer
    pub fn is_token_valid(&self) -> bool {
        let state = self.state.lock();
        let buffer_ms = i64::try_from(self.settings.validity_buffer_ms).unwrap_or(i64::MAX);
        let now_ms = self.clock.millis_since_epoch();
        state.session.is_some()
            && state.expires_at_ms.is_some_and(|expires_at| expires_at > now_ms.saturating_add(buffer_ms))
    }

    pub fn status(&self) -> TokenStatus {
        let state = self.state.lock();
        self.status_of(&state)
    }

    fn status_of(&self, state: &TokenState) -> TokenStatus {
        if state.session.is_none() {
            TokenStatus::Uninitialized
        } else if state.is_refreshing {
            TokenStatus::Refreshing
        } else if state.expires_at_ms.is_some_and(|expires_at| expires_at <= self.clock.millis_since_epoch()) {
            TokenStatus::Expired
        } else {
            TokenStatus::Valid
        }
    }

    /// Secret-free view of the token state
    pub fn snapshot(&self) -> TokenSnapshot {
        let state = self.state.lock();
        let session = state.session.as_ref();
        TokenSnapshot {
            status: self.status_of(&state),
            has_token: session.is_some(),
            has_refresh_token: session.is_some_and(|session| session.refresh_token.is_some()),
            expires_at_ms: state.expires_at_ms,
            last_refresh_ms: state.last_refresh_ms,
            refresh_attempts: state.refresh_attempts,
            is_refreshing: state.is_refreshing,
            user_id: session.and_then(|session| session.user_id.clone()),
        }
    }

    /// Current access token, if one is held
    pub fn access_token(&self) -> Option<String> {
        self.state.lock().session.as_ref().map(|session| session.access_token.clone())
    }

    /// When the proactive timer is due, in epoch milliseconds
    pub fn next_refresh_ms(&self) -> Option<i64> {
        self.state.lock().next_refresh_ms
    }

    /// Drop the held session and cancel the proactive and retry timers
    pub fn clear(&self) {
        self.refresh_timer.cancel();
        self.retry_timer.cancel();
        self.finish_cycle(false);
        {
            let mut state = self.state.lock();
            let generation = state.generation;
            *state = TokenState { generation, ..TokenState::default() };
        }
        info!("Token state cleared");
        self.events.publish(ConnectivityEvent::TokenCleared);
    }

    /// Cancel every timer and stop adopting recovered sessions
    pub fn shutdown(&self) {
        self.refresh_timer.cancel();
        self.retry_timer.cancel();
        self.fallback_timer.cancel();
        if let Some(listener) = self.session_listener.lock().take() {
            listener.abort();
        }
        debug!("Token lifecycle manager shut down");
    }
}
