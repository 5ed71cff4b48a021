//! Connectivity and auth notification events

use serde::{Deserialize, Serialize};

use super::recovery::RecoveryStrategy;
use super::session::Session;
use crate::errors::ErrorKind;
use crate::impl_wire_name_conversions;

/// State transitions announced on the connectivity event bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectivityEvent {
    RecoveryStarted { reason: String, attempt: u32 },
    RecoveryCompleted { reason: String, strategy: RecoveryStrategy, attempts: u32 },
    RecoveryFailed { reason: String, attempt: u32, circuit_open: bool },
    CircuitBreakerOpened { attempts: u32, cooldown_ms: u64 },
    TokenUpdated { expires_at_ms: Option<i64> },
    TokenCleared,
    RefreshStarted { attempt: u32 },
    RefreshCompleted { expires_at_ms: Option<i64> },
    RefreshFailed { attempt: u32, kind: ErrorKind, message: String, will_retry: bool },
}

/// Discriminant of [`ConnectivityEvent`], for filtering subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RecoveryStarted,
    RecoveryCompleted,
    RecoveryFailed,
    CircuitBreakerOpened,
    TokenUpdated,
    TokenCleared,
    RefreshStarted,
    RefreshCompleted,
    RefreshFailed,
}

impl_wire_name_conversions!(EventKind {
    RecoveryStarted => "recovery_started",
    RecoveryCompleted => "recovery_completed",
    RecoveryFailed => "recovery_failed",
    CircuitBreakerOpened => "circuit_breaker_opened",
    TokenUpdated => "token_updated",
    TokenCleared => "token_cleared",
    RefreshStarted => "refresh_started",
    RefreshCompleted => "refresh_completed",
    RefreshFailed => "refresh_failed",
});

impl ConnectivityEvent {
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::RecoveryStarted { .. } => EventKind::RecoveryStarted,
            Self::RecoveryCompleted { .. } => EventKind::RecoveryCompleted,
            Self::RecoveryFailed { .. } => EventKind::RecoveryFailed,
            Self::CircuitBreakerOpened { .. } => EventKind::CircuitBreakerOpened,
            Self::TokenUpdated { .. } => EventKind::TokenUpdated,
            Self::TokenCleared => EventKind::TokenCleared,
            Self::RefreshStarted { .. } => EventKind::RefreshStarted,
            Self::RefreshCompleted { .. } => EventKind::RefreshCompleted,
            Self::RefreshFailed { .. } => EventKind::RefreshFailed,
        }
    }
}

/// Auth notifications pushed by the backend client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

impl_wire_name_conversions!(AuthEvent {
    InitialSession => "INITIAL_SESSION",
    SignedIn => "SIGNED_IN",
    SignedOut => "SIGNED_OUT",
    TokenRefreshed => "TOKEN_REFRESHED",
    UserUpdated => "USER_UPDATED",
    PasswordRecovery => "PASSWORD_RECOVERY",
});

impl AuthEvent {
    /// Events whose accompanying session should replace the held one
    pub const fn establishes_session(self) -> bool {
        matches!(self, Self::InitialSession | Self::SignedIn | Self::TokenRefreshed | Self::UserUpdated)
    }
}

/// One auth notification with the session it carried, if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStateChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

impl AuthStateChange {
    pub const fn new(event: AuthEvent, session: Option<Session>) -> Self {
        Self { event, session }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_matches_variant() {
        let event = ConnectivityEvent::RefreshFailed {
            attempt: 2,
            kind: ErrorKind::TransientNetwork,
            message: "timeout".into(),
            will_retry: true,
        };
        assert_eq!(event.kind(), EventKind::RefreshFailed);
        assert_eq!(ConnectivityEvent::TokenCleared.kind().to_string(), "token_cleared");
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json = serde_json::to_value(ConnectivityEvent::RecoveryCompleted {
            reason: "auth_expired".into(),
            strategy: RecoveryStrategy::RefreshSession,
            attempts: 1,
        })
        .unwrap();
        assert_eq!(json["type"], "recovery_completed");
        assert_eq!(json["strategy"], "refresh_session");
    }

    #[test]
    fn test_auth_event_wire_names() {
        assert_eq!("TOKEN_REFRESHED".parse::<AuthEvent>(), Ok(AuthEvent::TokenRefreshed));
        assert_eq!(serde_json::to_value(AuthEvent::SignedOut).unwrap(), "SIGNED_OUT");
        assert!(AuthEvent::UserUpdated.establishes_session());
        assert!(!AuthEvent::SignedOut.establishes_session());
        assert!(!AuthEvent::PasswordRecovery.establishes_session());
    }
}
