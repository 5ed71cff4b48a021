//! Explicit connectivity context
//!
//! Builds the event bus, recovery orchestrator, token manager and facade from
//! one [`ConnectivityConfig`] and the external ports, and owns every
//! background task they start. Dropping the context (or calling
//! [`ConnectivityContext::teardown`]) stops all of them; a context built
//! afterwards starts from a clean slate.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use unimoghub_common::{EventBus, EventSubscription, SharedClock};
use unimoghub_domain::constants::REASON_REFRESH_WITHOUT_SESSION;
use unimoghub_domain::{AuthEvent, AuthStateChange, ConnectivityConfig, ConnectivityEvent};

use crate::auth::ports::AuthClient;
use crate::auth::TokenLifecycleManager;
use crate::credential_ports::CredentialStore;
use crate::facade::ports::ResourceClient;
use crate::facade::ConnectivityFacade;
use crate::recovery::RecoveryOrchestrator;

/// Buffered events per subscriber before it starts lagging
const EVENT_BUS_CAPACITY: usize = 256;

/// External collaborators the context is built from
#[derive(Clone)]
pub struct ContextPorts {
    pub auth: Arc<dyn AuthClient>,
    pub resources: Arc<dyn ResourceClient>,
    pub credentials: Arc<dyn CredentialStore>,
    pub clock: SharedClock,
}

impl fmt::Debug for ContextPorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextPorts").finish_non_exhaustive()
    }
}

/// Owner of the whole connectivity layer
pub struct ConnectivityContext {
    config: ConnectivityConfig,
    events: EventBus<ConnectivityEvent>,
    auth: Arc<dyn AuthClient>,
    recovery: Arc<RecoveryOrchestrator>,
    tokens: Arc<TokenLifecycleManager>,
    facade: Arc<ConnectivityFacade>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl fmt::Debug for ConnectivityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityContext")
            .field("started", &self.started.load(Ordering::Acquire))
            .field("recovery", &self.recovery)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl ConnectivityContext {
    /// Validate `config` and wire every component; nothing runs until
    /// [`start`](Self::start)
    pub fn new(config: ConnectivityConfig, ports: ContextPorts) -> anyhow::Result<Self> {
        config.validate()?;

        let events = EventBus::new(EVENT_BUS_CAPACITY);
        let recovery = RecoveryOrchestrator::new(
            &config,
            Arc::clone(&ports.auth),
            ports.credentials,
            Arc::clone(&ports.clock),
            events.clone(),
        );
        let tokens = TokenLifecycleManager::new(
            config.token.clone(),
            Arc::clone(&ports.auth),
            Arc::clone(&recovery),
            events.clone(),
            Arc::clone(&ports.clock),
        );
        let facade = ConnectivityFacade::new(&config, ports.resources, ports.clock)?
            .with_recovery(Arc::clone(&recovery));

        Ok(Self {
            config,
            events,
            auth: ports.auth,
            recovery,
            tokens,
            facade: Arc::new(facade),
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Load the current session and start every background task
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("Connectivity context already started");
            return;
        }

        // Subscribe first so no notification slips in during initialization
        self.spawn_auth_listener();
        self.tokens.initialize().await;
        self.recovery.start_monitoring();
        info!("Connectivity context started");
    }

    fn spawn_auth_listener(&self) {
        let changes = self.auth.subscribe();
        let tokens = Arc::downgrade(&self.tokens);
        let recovery = Arc::downgrade(&self.recovery);
        let listener = tokio::spawn(forward_auth_events(changes, tokens, recovery));
        self.tasks.lock().push(listener);
    }

    /// Stop every task and timer and return all state to its initial values
    pub fn teardown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.tokens.shutdown();
        self.tokens.clear();
        self.recovery.shutdown();
        self.recovery.reset_recovery_state();
        let discarded = self.recovery.discard_pending();
        self.facade.reset_circuit_breaker();
        self.facade.clear_metrics();
        self.started.store(false, Ordering::Release);
        info!(discarded, "Connectivity context torn down");
    }

    pub fn facade(&self) -> &Arc<ConnectivityFacade> {
        &self.facade
    }

    pub fn tokens(&self) -> &Arc<TokenLifecycleManager> {
        &self.tokens
    }

    pub fn recovery(&self) -> &Arc<RecoveryOrchestrator> {
        &self.recovery
    }

    pub fn events(&self) -> &EventBus<ConnectivityEvent> {
        &self.events
    }

    pub fn subscribe(&self) -> EventSubscription<ConnectivityEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &ConnectivityConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

impl Drop for ConnectivityContext {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
        self.tokens.shutdown();
        self.recovery.shutdown();
    }
}

async fn forward_auth_events(
    mut changes: broadcast::Receiver<AuthStateChange>,
    tokens: Weak<TokenLifecycleManager>,
    recovery: Weak<RecoveryOrchestrator>,
) {
    loop {
        let change = match changes.recv().await {
            Ok(change) => change,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Auth listener lagged behind notifications");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        debug!(event = %change.event, has_session = change.session.is_some(), "Auth state change");

        if change.event == AuthEvent::TokenRefreshed && change.session.is_none() {
            warn!("Token refreshed without a session, starting recovery");
            if let Some(recovery) = recovery.upgrade() {
                recovery.spawn_recovery(REASON_REFRESH_WITHOUT_SESSION);
            }
            continue;
        }

        let Some(tokens) = tokens.upgrade() else {
            break;
        };
        tokens.handle_auth_event(change).await;
    }
}
