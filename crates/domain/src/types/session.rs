//! Session and token state types
//!
//! Backends report expiry in several shapes: epoch seconds, epoch
//! milliseconds, ISO 8601 strings, or a relative `expires_in`. Everything is
//! pinned to epoch milliseconds on ingestion via [`Session::anchored`].

use std::fmt;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::impl_wire_name_conversions;

/// Epoch values below this are read as seconds, above as milliseconds
const SECONDS_CUTOFF: i64 = 10_000_000_000;

/// Raw expiry as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expiry {
    Epoch(i64),
    Text(String),
}

impl Expiry {
    /// Normalize to epoch milliseconds; `None` if unparseable
    pub fn to_epoch_ms(&self) -> Option<i64> {
        match self {
            Self::Epoch(value) => Some(epoch_to_ms(*value)),
            Self::Text(text) => {
                let text = text.trim();
                if let Ok(value) = text.parse::<i64>() {
                    return Some(epoch_to_ms(value));
                }
                DateTime::parse_from_rfc3339(text).ok().map(|parsed| parsed.timestamp_millis())
            }
        }
    }
}

const fn epoch_to_ms(value: i64) -> i64 {
    if value < SECONDS_CUTOFF {
        value.saturating_mul(1_000)
    } else {
        value
    }
}

/// Authenticated session issued by the backend
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Expiry>,
    /// Lifetime in seconds, relative to ingestion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("expires_in", &self.expires_in)
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl Session {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            expires_in: None,
            user_id: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_expires_at(mut self, expiry: Expiry) -> Self {
        self.expires_at = Some(expiry);
        self
    }

    #[must_use]
    pub const fn with_expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Absolute expiry in epoch milliseconds
    ///
    /// `expires_at` wins when it parses; otherwise `expires_in` is applied
    /// to `now_ms`.
    pub fn expires_at_ms(&self, now_ms: i64) -> Option<i64> {
        self.expires_at.as_ref().and_then(Expiry::to_epoch_ms).or_else(|| {
            self.expires_in
                .map(|seconds| now_ms.saturating_add(i64::try_from(seconds).unwrap_or(i64::MAX).saturating_mul(1_000)))
        })
    }

    /// Pin the expiry to an absolute epoch-millisecond value
    ///
    /// `expires_in` only means something relative to the moment the session
    /// was received, so it is folded into `expires_at` against `now_ms` and
    /// dropped. Stored, backed-up and broadcast sessions are always anchored.
    #[must_use]
    pub fn anchored(mut self, now_ms: i64) -> Self {
        if let Some(expiry_ms) = self.expires_at_ms(now_ms) {
            self.expires_at = Some(Expiry::Epoch(expiry_ms));
        }
        self.expires_in = None;
        self
    }

    /// Whether the session's expiry has passed
    ///
    /// Sessions without any expiry are never considered expired. A
    /// relative-only expiry cannot be placed in time and counts as lapsed.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        match self.expires_at.as_ref().and_then(Expiry::to_epoch_ms) {
            Some(expiry) => expiry <= now_ms,
            None => self.expires_in.is_some(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Session copy kept outside the backend client's cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBackup {
    pub session: Session,
    pub backed_up_at_ms: i64,
}

impl SessionBackup {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Derived token lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenStatus {
    Uninitialized,
    Valid,
    Refreshing,
    Expired,
}

impl_wire_name_conversions!(TokenStatus {
    Uninitialized => "UNINITIALIZED",
    Valid => "VALID",
    Refreshing => "REFRESHING",
    Expired => "EXPIRED",
});

/// Secret-free view of the token manager's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub status: TokenStatus,
    pub has_token: bool,
    pub has_refresh_token: bool,
    pub expires_at_ms: Option<i64>,
    pub last_refresh_ms: Option<i64>,
    pub refresh_attempts: u32,
    pub is_refreshing: bool,
    pub user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW_MS: i64 = 1_700_000_000_000;

    #[test]
    fn test_expiry_normalization() {
        assert_eq!(Expiry::Epoch(1_700_000_600).to_epoch_ms(), Some(1_700_000_600_000));
        assert_eq!(Expiry::Epoch(1_700_000_600_000).to_epoch_ms(), Some(1_700_000_600_000));
        assert_eq!(Expiry::Text("1700000600".into()).to_epoch_ms(), Some(1_700_000_600_000));
        assert_eq!(
            Expiry::Text("2023-11-14T22:23:20Z".into()).to_epoch_ms(),
            Some(1_700_000_600_000)
        );
        assert_eq!(Expiry::Text("next tuesday".into()).to_epoch_ms(), None);
    }

    #[test]
    fn test_expires_in_relative_to_now() {
        let session = Session::new("at").with_expires_in(600);
        assert_eq!(session.expires_at_ms(NOW_MS), Some(NOW_MS + 600_000));

        let absolute = Session::new("at").with_expires_at(Expiry::Epoch(1_700_000_100)).with_expires_in(600);
        assert_eq!(absolute.expires_at_ms(NOW_MS), Some(1_700_000_100_000));

        assert_eq!(Session::new("at").expires_at_ms(NOW_MS), None);
    }

    #[test]
    fn test_is_expired_at() {
        let session = Session::new("at").with_expires_at(Expiry::Epoch(1_700_000_000));
        assert!(session.is_expired_at(NOW_MS));
        assert!(!session.is_expired_at(NOW_MS - 1));
        assert!(Session::new("at").with_expires_in(3_600).is_expired_at(NOW_MS));
        assert!(!Session::new("at").is_expired_at(i64::MAX));
    }

    #[test]
    fn test_anchored_pins_relative_expiry() {
        let anchored = Session::new("at").with_expires_in(600).anchored(NOW_MS);
        assert_eq!(anchored.expires_at, Some(Expiry::Epoch(NOW_MS + 600_000)));
        assert_eq!(anchored.expires_in, None);
        assert_eq!(anchored.expires_at_ms(NOW_MS + 3_000_000), Some(NOW_MS + 600_000));

        let absolute = Session::new("at").with_expires_at(Expiry::Epoch(1_700_000_100)).anchored(NOW_MS);
        assert_eq!(absolute.expires_at, Some(Expiry::Epoch(1_700_000_100_000)));

        assert_eq!(Session::new("at").anchored(NOW_MS).expires_at, None);
    }

    #[test]
    fn test_session_json_accepts_backend_shapes() {
        let numeric = Session::from_json(r#"{"access_token":"a","expires_at":1700000600}"#).unwrap();
        assert_eq!(numeric.expires_at, Some(Expiry::Epoch(1_700_000_600)));

        let text = Session::from_json(r#"{"access_token":"a","expires_at":"2023-11-14T22:23:20Z"}"#).unwrap();
        assert_eq!(text.expires_at_ms(0), Some(1_700_000_600_000));

        assert!(Session::from_json("{not json").is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let session = Session::new("secret-access").with_refresh_token("secret-refresh").with_user_id("u-1");
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
        assert!(rendered.contains("u-1"));
    }

    #[test]
    fn test_backup_round_trip_keeps_timestamp() {
        let backup = SessionBackup { session: Session::new("a").with_expires_in(60), backed_up_at_ms: NOW_MS };
        let restored = SessionBackup::from_json(&backup.to_json().unwrap()).unwrap();
        assert_eq!(restored, backup);
    }
}
