//! Error types used throughout the application
//!
//! [`RemoteError`] is what the backend client hands back; [`classify`] maps
//! it onto the closed [`ErrorKind`] taxonomy exactly once, at the boundary.
//! Everything downstream branches on the kind only.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::impl_wire_name_conversions;

/// Main error type for UnimogHub
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum UnimogHubError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for UnimogHub operations
pub type Result<T> = std::result::Result<T, UnimogHubError>;

impl From<serde_json::Error> for UnimogHubError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Raw failure reported by the backend client
///
/// Field names follow the backend's error payload (`code`, `details`,
/// `hint`); `status` is the HTTP status when one was received.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct RemoteError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), ..Self::default() }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Classify this error; shorthand for [`classify`]
    pub fn kind(&self) -> ErrorKind {
        classify(self)
    }
}

/// Closed failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network, timeout, 5xx, 429 or anything unrecognised; retryable
    TransientNetwork,
    /// Invalid or expired credential; routed to recovery, never retried
    AuthExpired,
    /// Raised by the breaker without attempting the call
    CircuitOpen,
    /// Rejected input or constraint violation; surfaced as-is
    Validation,
}

impl_wire_name_conversions!(ErrorKind {
    TransientNetwork => "transient_network",
    AuthExpired => "auth_expired",
    CircuitOpen => "circuit_open",
    Validation => "validation",
});

impl ErrorKind {
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::TransientNetwork)
    }

    pub const fn requires_recovery(self) -> bool {
        matches!(self, Self::AuthExpired)
    }
}

/// Backend code for a missing or rejected credential
pub const CODE_AUTH_REQUIRED: &str = "PGRST301";
/// Unique constraint violation
pub const CODE_UNIQUE_VIOLATION: &str = "23505";
/// Foreign key violation
pub const CODE_FOREIGN_KEY_VIOLATION: &str = "23503";
/// Not-null violation
pub const CODE_NOT_NULL_VIOLATION: &str = "23502";
/// Malformed value for the column type
pub const CODE_INVALID_TEXT: &str = "22P02";

const VALIDATION_CODES: [&str; 4] =
    [CODE_UNIQUE_VIOLATION, CODE_FOREIGN_KEY_VIOLATION, CODE_NOT_NULL_VIOLATION, CODE_INVALID_TEXT];

const AUTH_MESSAGE_MARKERS: [&str; 2] = ["JWT", "Invalid API key"];

/// Map a raw backend failure onto [`ErrorKind`]
///
/// Credential failures win over everything else, then known constraint
/// codes, then client-side HTTP statuses. Whatever remains (network errors,
/// timeouts, 5xx, 429, unknown shapes) is treated as transient.
pub fn classify(error: &RemoteError) -> ErrorKind {
    let code = error.code.as_deref();

    if code == Some(CODE_AUTH_REQUIRED)
        || matches!(error.status, Some(401 | 403))
        || AUTH_MESSAGE_MARKERS.iter().any(|marker| error.message.contains(marker))
    {
        return ErrorKind::AuthExpired;
    }

    if code.is_some_and(|code| VALIDATION_CODES.contains(&code)) {
        return ErrorKind::Validation;
    }

    match error.status {
        Some(429) => ErrorKind::TransientNetwork,
        Some(status) if (400..500).contains(&status) => ErrorKind::Validation,
        _ => ErrorKind::TransientNetwork,
    }
}

/// User-facing message for well-known backend codes
pub fn friendly_message(error: &RemoteError) -> Option<&'static str> {
    match error.code.as_deref()? {
        CODE_AUTH_REQUIRED => Some("Authentication required. Please sign in."),
        CODE_UNIQUE_VIOLATION => Some("This record already exists."),
        CODE_FOREIGN_KEY_VIOLATION => Some("Referenced record not found."),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures() {
        assert_eq!(classify(&RemoteError::new("no").with_code("PGRST301")), ErrorKind::AuthExpired);
        assert_eq!(classify(&RemoteError::new("unauthorized").with_status(401)), ErrorKind::AuthExpired);
        assert_eq!(classify(&RemoteError::new("forbidden").with_status(403)), ErrorKind::AuthExpired);
        assert_eq!(classify(&RemoteError::new("JWT expired")), ErrorKind::AuthExpired);
        assert_eq!(classify(&RemoteError::new("Invalid API key")), ErrorKind::AuthExpired);
    }

    #[test]
    fn test_validation_failures() {
        for code in ["23505", "23503", "23502", "22P02"] {
            assert_eq!(classify(&RemoteError::new("bad").with_code(code)), ErrorKind::Validation);
        }
        assert_eq!(classify(&RemoteError::new("bad request").with_status(400)), ErrorKind::Validation);
        assert_eq!(classify(&RemoteError::new("not found").with_status(404)), ErrorKind::Validation);
    }

    #[test]
    fn test_transient_failures() {
        assert_eq!(classify(&RemoteError::new("slow down").with_status(429)), ErrorKind::TransientNetwork);
        assert_eq!(classify(&RemoteError::new("bad gateway").with_status(502)), ErrorKind::TransientNetwork);
        assert_eq!(classify(&RemoteError::new("fetch failed")), ErrorKind::TransientNetwork);
        assert_eq!(classify(&RemoteError::new("conn").with_code("ECONNREFUSED")), ErrorKind::TransientNetwork);
    }

    #[test]
    fn test_auth_wins_over_status() {
        let error = RemoteError::new("JWT malformed").with_status(400);
        assert_eq!(error.kind(), ErrorKind::AuthExpired);
    }

    #[test]
    fn test_friendly_messages() {
        assert_eq!(
            friendly_message(&RemoteError::new("x").with_code("PGRST301")),
            Some("Authentication required. Please sign in.")
        );
        assert_eq!(friendly_message(&RemoteError::new("x").with_code("23505")), Some("This record already exists."));
        assert_eq!(friendly_message(&RemoteError::new("x").with_code("23503")), Some("Referenced record not found."));
        assert_eq!(friendly_message(&RemoteError::new("x").with_code("23502")), None);
        assert_eq!(friendly_message(&RemoteError::new("x")), None);
    }

    #[test]
    fn test_error_kind_wire_names() {
        assert_eq!(ErrorKind::AuthExpired.to_string(), "auth_expired");
        assert_eq!("CIRCUIT_OPEN".parse::<ErrorKind>(), Ok(ErrorKind::CircuitOpen));
        assert!(ErrorKind::TransientNetwork.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(ErrorKind::AuthExpired.requires_recovery());
    }

    #[test]
    fn test_error_serialization_is_tagged() {
        let json = serde_json::to_value(UnimogHubError::Config("missing url".into())).unwrap();
        assert_eq!(json, serde_json::json!({"type": "Config", "message": "missing url"}));
    }
}
