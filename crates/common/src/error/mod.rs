//! Common error types and classification
//!
//! Two pieces live here:
//!
//! 1. **`CommonError`**: error patterns that recur across crates (persistence,
//!    serialization, configuration, backend failures). Adapters such as the
//!    credential stores return it directly.
//!
//! 2. **`ErrorClassification`**: the standard interface for deciding whether an
//!    error is worth retrying and how loudly it should be reported. Layer
//!    specific errors implement it so retry and logging decisions stay
//!    uniform.
//!
//! ## Severity Levels
//!
//! | Level | Use Case |
//! |-------|----------|
//! | **Info** | Expected conditions (missing entry, empty result) |
//! | **Warning** | Degraded but operational (transient network, open circuit) |
//! | **Error** | Failure requiring attention (invalid input, bad config) |
//! | **Critical** | Integrity at risk (internal invariant broken) |

use std::fmt;
use std::time::Duration;

/// Standard result type using CommonError
pub type CommonResult<T> = Result<T, CommonError>;

/// Common error variants that appear across multiple crates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Configuration-related errors
    Config { message: String, field: Option<String> },

    /// Serialization or deserialization errors
    Serialization { message: String, format: Option<String> },

    /// Data persistence errors (file I/O, key-value stores)
    Persistence { message: String, operation: Option<String> },

    /// Timeout errors
    Timeout { operation: String, duration: Duration },

    /// Network or backend connectivity errors
    Backend { service: String, message: String, is_retryable: bool },

    /// Validation errors
    Validation { field: String, message: String },

    /// Resource not found errors
    NotFound { resource_type: String, identifier: Option<String> },

    /// Internal errors that shouldn't normally occur
    Internal { message: String },
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message, field } => match field {
                Some(field) => write!(f, "Configuration error in field '{}': {}", field, message),
                None => write!(f, "Configuration error: {}", message),
            },
            Self::Serialization { message, format } => match format {
                Some(format) => write!(f, "Serialization error ({}): {}", format, message),
                None => write!(f, "Serialization error: {}", message),
            },
            Self::Persistence { message, operation } => match operation {
                Some(op) => write!(f, "Persistence error during '{}': {}", op, message),
                None => write!(f, "Persistence error: {}", message),
            },
            Self::Timeout { operation, duration } => {
                write!(f, "Operation '{}' timed out after {:?}", operation, duration)
            }
            Self::Backend { service, message, .. } => {
                write!(f, "Backend error from '{}': {}", service, message)
            }
            Self::Validation { field, message } => {
                write!(f, "Validation error for field '{}': {}", field, message)
            }
            Self::NotFound { resource_type, identifier } => match identifier {
                Some(id) => write!(f, "{} not found: '{}'", resource_type, id),
                None => write!(f, "{} not found", resource_type),
            },
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for CommonError {}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Backend { is_retryable, .. } => *is_retryable,
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::NotFound { .. } => ErrorSeverity::Info,
            Self::Internal { .. } => ErrorSeverity::Critical,
            Self::Config { .. }
            | Self::Serialization { .. }
            | Self::Persistence { .. }
            | Self::Backend { .. }
            | Self::Validation { .. } => ErrorSeverity::Error,
        }
    }
}

impl CommonError {
    /// Create a simple configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), field: None }
    }

    /// Create a configuration error for a specific field
    pub fn config_field<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    /// Create a serialization error with format information
    pub fn serialization_format<F: Into<String>, S: Into<String>>(format: F, message: S) -> Self {
        Self::Serialization { message: message.into(), format: Some(format.into()) }
    }

    /// Create a simple persistence error
    pub fn persistence<S: Into<String>>(message: S) -> Self {
        Self::Persistence { message: message.into(), operation: None }
    }

    /// Create a persistence error for a specific operation
    pub fn persistence_op<O: Into<String>, S: Into<String>>(operation: O, message: S) -> Self {
        Self::Persistence { message: message.into(), operation: Some(operation.into()) }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, duration: Duration) -> Self {
        Self::Timeout { operation: operation.into(), duration }
    }

    /// Create a backend error
    pub fn backend<S: Into<String>, M: Into<String>>(
        service: S,
        message: M,
        is_retryable: bool,
    ) -> Self {
        Self::Backend { service: service.into(), message: message.into(), is_retryable }
    }

    /// Create a validation error
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    /// Create a not found error with an identifier
    pub fn not_found_id<T: Into<String>, I: Into<String>>(resource_type: T, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), identifier: Some(id.into()) }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }
}

/// Standard interface for classifying errors
///
/// Implemented by every layer-specific error so retry decisions and log
/// levels follow one rule set.
pub trait ErrorClassification {
    /// Whether the failed operation may succeed if attempted again
    fn is_retryable(&self) -> bool;

    /// Severity used for logging and alerting decisions
    fn severity(&self) -> ErrorSeverity;

    /// Whether this error requires immediate attention
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Suggested retry delay, if the failure carried one
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_format("JSON", err.to_string())
    }
}

impl From<std::io::Error> for CommonError {
    fn from(err: std::io::Error) -> Self {
        Self::persistence(err.to_string())
    }
}

impl From<toml::de::Error> for CommonError {
    fn from(err: toml::de::Error) -> Self {
        Self::serialization_format("TOML", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for error classification.
    use super::*;

    /// Validates `CommonError` display formatting for optional context.
    ///
    /// Assertions:
    /// - Confirms the field or operation appears when provided.
    #[test]
    fn test_display_includes_context() {
        assert_eq!(
            CommonError::config_field("backend.url", "missing").to_string(),
            "Configuration error in field 'backend.url': missing"
        );
        assert_eq!(
            CommonError::persistence_op("write", "disk full").to_string(),
            "Persistence error during 'write': disk full"
        );
        assert_eq!(
            CommonError::not_found_id("Session", "sb-auth").to_string(),
            "Session not found: 'sb-auth'"
        );
    }

    /// Validates `ErrorClassification` for the retryable variants.
    ///
    /// Assertions:
    /// - Ensures timeouts and retryable backend errors are retryable.
    /// - Ensures persistence and validation errors are not.
    #[test]
    fn test_retryability() {
        assert!(CommonError::timeout("select", Duration::from_secs(1)).is_retryable());
        assert!(CommonError::backend("remote", "503", true).is_retryable());
        assert!(!CommonError::backend("remote", "400", false).is_retryable());
        assert!(!CommonError::persistence("io").is_retryable());
        assert!(!CommonError::validation("email", "bad").is_retryable());
    }

    /// Validates severity mapping and the derived `is_critical`.
    ///
    /// Assertions:
    /// - Confirms internal errors are the only critical ones.
    #[test]
    fn test_severity() {
        assert!(CommonError::internal("broken invariant").is_critical());
        assert_eq!(
            CommonError::not_found_id("Session", "x").severity(),
            ErrorSeverity::Info
        );
        assert!(!CommonError::config("bad").is_critical());
        assert!(ErrorSeverity::Critical > ErrorSeverity::Warning);
    }

    /// Validates conversions from standard error types.
    ///
    /// Assertions:
    /// - Confirms JSON errors become serialization errors tagged `JSON`.
    /// - Confirms IO errors become persistence errors.
    #[test]
    fn test_conversions() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(
            CommonError::from(json_err),
            CommonError::Serialization { format: Some(ref f), .. } if f == "JSON"
        ));

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(CommonError::from(io_err), CommonError::Persistence { .. }));
    }
}
