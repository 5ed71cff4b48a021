//! Individual recovery strategies
//!
//! Each strategy is independent: an error in one is logged by the
//! orchestrator and the next strategy still runs.

use std::time::Duration;

use tracing::{debug, info, warn};
use unimoghub_common::Clock;
use unimoghub_domain::{
    BackendConfig, RecoveryStrategy, Session, SessionBackup, StorageSettings,
};

use crate::auth::ports::AuthClient;
use crate::credential_ports::CredentialStore;

/// What a strategy achieved
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// A usable session is available again
    Recovered(Session),
    /// Environment shape was checked; never counts as recovery
    EnvironmentChecked(bool),
    Unrecovered,
}

/// Borrowed collaborators for one recovery pass
pub(crate) struct StrategyRunner<'a> {
    pub auth: &'a dyn AuthClient,
    pub store: &'a dyn CredentialStore,
    pub clock: &'a dyn Clock,
    pub backend: &'a BackendConfig,
    pub storage: &'a StorageSettings,
    pub settle_delay: Duration,
}

impl StrategyRunner<'_> {
    pub(crate) async fn run(&self, strategy: RecoveryStrategy) -> anyhow::Result<Verdict> {
        match strategy {
            RecoveryStrategy::PurgeExpiredCredentials => self.purge_expired_credentials().await,
            RecoveryStrategy::ValidateEnvironment => Ok(self.validate_environment()),
            RecoveryStrategy::RefreshSession => self.refresh_session().await,
            RecoveryStrategy::ResetAuthState => self.reset_auth_state().await,
            RecoveryStrategy::RestoreBackup => self.restore_backup().await,
        }
    }

    async fn purge_expired_credentials(&self) -> anyhow::Result<Verdict> {
        let now_ms = self.clock.millis_since_epoch();
        let mut purged = 0usize;

        for key in self.namespaced_keys().await? {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            let stale = Session::from_json(&raw).map_or(true, |session| session.is_expired_at(now_ms));
            if stale {
                self.store.remove(&key).await?;
                purged += 1;
            }
        }

        debug!(purged, "Purged stale cached credentials");
        self.probe_session().await
    }

    fn validate_environment(&self) -> Verdict {
        match self.backend.check_shape() {
            Ok(()) => Verdict::EnvironmentChecked(true),
            Err(problems) => {
                warn!(?problems, "Backend configuration looks invalid");
                Verdict::EnvironmentChecked(false)
            }
        }
    }

    async fn refresh_session(&self) -> anyhow::Result<Verdict> {
        Ok(self.auth.refresh_session().await?.map_or(Verdict::Unrecovered, Verdict::Recovered))
    }

    async fn reset_auth_state(&self) -> anyhow::Result<Verdict> {
        if let Err(err) = self.auth.sign_out().await {
            warn!(error = %err, "Sign-out during auth reset failed");
        }

        let keys = self.namespaced_keys().await?;
        for key in &keys {
            self.store.remove(key).await?;
        }
        info!(cleared = keys.len(), "Local auth state cleared");

        tokio::time::sleep(self.settle_delay).await;
        self.probe_session().await
    }

    async fn restore_backup(&self) -> anyhow::Result<Verdict> {
        let Some(raw) = self.store.get(&self.storage.backup_key).await? else {
            debug!("No session backup stored");
            return Ok(Verdict::Unrecovered);
        };

        let backup = SessionBackup::from_json(&raw)?;
        let session = backup.session.anchored(backup.backed_up_at_ms);
        let now_ms = self.clock.millis_since_epoch();
        let usable = session.expires_at_ms(now_ms).map_or(true, |expiry| expiry > now_ms);

        if usable {
            Ok(Verdict::Recovered(session))
        } else {
            debug!(backed_up_at_ms = backup.backed_up_at_ms, "Session backup has expired");
            Ok(Verdict::Unrecovered)
        }
    }

    async fn probe_session(&self) -> anyhow::Result<Verdict> {
        Ok(self.auth.get_session().await?.map_or(Verdict::Unrecovered, Verdict::Recovered))
    }

    async fn namespaced_keys(&self) -> anyhow::Result<Vec<String>> {
        let namespace = self.storage.credential_namespace.as_str();
        let mut keys = self.store.keys().await?;
        keys.retain(|key| key.starts_with(namespace));
        Ok(keys)
    }
}
