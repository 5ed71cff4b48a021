//! Connectivity error surfaced to domain code
//!
//! Every remote failure is classified once, on the way out of the resource
//! client, and carried as a [`ConnectivityError`] from then on. The original
//! `code`, `details` and `hint` stay attached for diagnostics.

use std::time::Duration;

use thiserror::Error;
use unimoghub_common::{ErrorClassification, ErrorSeverity};
use unimoghub_domain::{friendly_message, ErrorKind, RemoteError};

/// Result type for facade operations
pub type ConnectivityResult<T> = Result<T, ConnectivityError>;

/// Classified failure of a facade call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConnectivityError {
    pub kind: ErrorKind,
    /// Human-readable message; known backend codes are translated
    pub message: String,
    pub code: Option<String>,
    pub status: Option<u16>,
    pub details: Option<String>,
    pub hint: Option<String>,
    /// Retries performed before the error was returned
    pub retry_count: u32,
    /// Remaining breaker cooldown for [`ErrorKind::CircuitOpen`]
    pub retry_after: Option<Duration>,
}

impl ConnectivityError {
    /// Classify a backend failure
    pub fn from_remote(error: RemoteError) -> Self {
        let kind = error.kind();
        let message = friendly_message(&error).map_or(error.message, ToString::to_string);
        Self {
            kind,
            message,
            code: error.code,
            status: error.status,
            details: error.details,
            hint: error.hint,
            retry_count: 0,
            retry_after: None,
        }
    }

    /// Synthetic rejection raised by an open circuit
    pub fn circuit_open(retry_after: Duration) -> Self {
        Self {
            kind: ErrorKind::CircuitOpen,
            message: format!(
                "Service temporarily unavailable, retry in {}ms",
                retry_after.as_millis()
            ),
            code: None,
            status: None,
            details: None,
            hint: None,
            retry_count: 0,
            retry_after: Some(retry_after),
        }
    }

    #[must_use]
    pub const fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub const fn is_auth_expired(&self) -> bool {
        matches!(self.kind, ErrorKind::AuthExpired)
    }

    pub const fn is_circuit_open(&self) -> bool {
        matches!(self.kind, ErrorKind::CircuitOpen)
    }
}

impl From<RemoteError> for ConnectivityError {
    fn from(error: RemoteError) -> Self {
        Self::from_remote(error)
    }
}

impl ErrorClassification for ConnectivityError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    fn severity(&self) -> ErrorSeverity {
        match self.kind {
            ErrorKind::TransientNetwork | ErrorKind::CircuitOpen => ErrorSeverity::Warning,
            ErrorKind::AuthExpired | ErrorKind::Validation => ErrorSeverity::Error,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}
