//! Integration tests for error classification and session ingestion
//!
//! Covers the payload shapes the backend actually produces: error bodies
//! deserialized from JSON and sessions in each supported expiry format.

use unimoghub_domain::{
    classify, friendly_message, ConnectivityConfig, ErrorKind, Expiry, RemoteError, Session,
};

// ============================================================================
// Error Classification
// ============================================================================

/// Test classification of error bodies as the backend serializes them
///
/// Scenario: the client deserializes error payloads straight into
/// `RemoteError` and the facade classifies them once
#[test]
fn test_classify_backend_payloads() {
    let cases = [
        (r#"{"code":"PGRST301","message":"JWT expired","status":401}"#, ErrorKind::AuthExpired),
        (
            r#"{"code":"23505","message":"duplicate key value violates unique constraint","details":"Key (slug)=(g-class) already exists.","status":409}"#,
            ErrorKind::Validation,
        ),
        (r#"{"code":"22P02","message":"invalid input syntax for type uuid","status":400}"#, ErrorKind::Validation),
        (r#"{"message":"upstream connect error","status":503}"#, ErrorKind::TransientNetwork),
        (r#"{"message":"Too many requests","status":429}"#, ErrorKind::TransientNetwork),
        (r#"{"message":"fetch failed"}"#, ErrorKind::TransientNetwork),
    ];

    for (payload, expected) in cases {
        let error: RemoteError = serde_json::from_str(payload).expect("valid payload");
        assert_eq!(classify(&error), expected, "payload: {payload}");
    }
}

/// Test that friendly messages leave diagnostic fields untouched
#[test]
fn test_friendly_message_preserves_details() {
    let error: RemoteError = serde_json::from_str(
        r#"{"code":"23503","message":"insert or update violates foreign key","details":"Key (group_id)=(42) is not present","hint":"check group"}"#,
    )
    .expect("valid payload");

    assert_eq!(friendly_message(&error), Some("Referenced record not found."));
    assert_eq!(error.details.as_deref(), Some("Key (group_id)=(42) is not present"));
    assert_eq!(error.hint.as_deref(), Some("check group"));
}

// ============================================================================
// Session Ingestion
// ============================================================================

/// Test that every expiry shape normalizes to the same instant
///
/// Scenario: the same session arrives from sign-in (epoch seconds), a
/// cached copy (epoch millis), a backup (ISO 8601) and a refresh response
/// that only carries `expires_in`
#[test]
fn test_expiry_shapes_agree() {
    let now_ms = 1_700_000_000_000;
    let expected = Some(now_ms + 3_600_000);

    let sessions = [
        Session::new("a").with_expires_at(Expiry::Epoch(1_700_003_600)),
        Session::new("a").with_expires_at(Expiry::Epoch(1_700_003_600_000)),
        Session::new("a").with_expires_at(Expiry::Text("2023-11-14T23:13:20+00:00".into())),
        Session::new("a").with_expires_in(3_600),
    ];

    for session in sessions {
        assert_eq!(session.expires_at_ms(now_ms), expected, "session: {session:?}");
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Test loading a partially specified configuration through serde
#[test]
fn test_config_from_json_sections() {
    let config: ConnectivityConfig = serde_json::from_value(serde_json::json!({
        "backend": {"url": "https://unimog.example.com", "anon_key": "eyJa.eyJb.c"},
        "circuit_breaker": {"failure_threshold": 3},
        "token": {"refresh_buffer_minutes": 2},
        "recovery": {"monitoring_enabled": false},
        "storage": {"file_path": "/tmp/creds.json"}
    }))
    .expect("valid config");

    assert!(config.validate().is_ok());
    assert!(config.backend.check_shape().is_ok());
    assert_eq!(config.circuit_breaker.failure_threshold, 3);
    assert_eq!(config.circuit_breaker.cooldown_ms, 60_000);
    assert_eq!(config.token.refresh_buffer_minutes, 2);
    assert!(!config.recovery.monitoring_enabled);
    assert_eq!(config.storage.file_path.as_deref(), Some("/tmp/creds.json"));
    assert_eq!(config.storage.credential_namespace, "sb-");
}
