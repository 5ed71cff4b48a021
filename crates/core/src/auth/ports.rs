//! Port interfaces for the backend auth client
//!
//! The wire protocol is the client's business; core only sees sessions,
//! raw [`RemoteError`]s and auth notifications.

use async_trait::async_trait;
use tokio::sync::broadcast;
use unimoghub_domain::{AuthStateChange, RemoteError, Session};

/// Trait for the backend's authentication API
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Current session, as cached by the client
    async fn get_session(&self) -> Result<Option<Session>, RemoteError>;

    /// Exchange the refresh token for a new session
    async fn refresh_session(&self) -> Result<Option<Session>, RemoteError>;

    /// Invalidate the session locally and remotely
    async fn sign_out(&self) -> Result<(), RemoteError>;

    /// Subscribe to auth state notifications
    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange>;
}
