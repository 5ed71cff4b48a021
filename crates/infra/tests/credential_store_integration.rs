//! Integration tests for the credential stores
//!
//! Exercises the file store against a real temporary directory and checks
//! the store factory picks the backend named by the storage settings.

use tempfile::TempDir;
use unimoghub_core::CredentialStore;
use unimoghub_domain::StorageSettings;
use unimoghub_infra::{credential_store, FileCredentialStore};

// ============================================================================
// File Store
// ============================================================================

/// Validates that entries survive a new store instance.
///
/// # Test Steps
/// 1. Write two entries and remove one
/// 2. Open a second store on the same file
/// 3. Verify only the remaining entry is visible
#[tokio::test]
async fn test_file_store_persists_across_instances() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("nested").join("credentials.json");

    let store = FileCredentialStore::new(&path);
    store.set("sb-project-auth-token", "{\"access_token\":\"at-1\"}").await.expect("set token");
    store.set("auth-backup:session", "{}").await.expect("set backup");
    store.remove("sb-project-auth-token").await.expect("remove token");

    let reopened = FileCredentialStore::new(&path);
    assert_eq!(reopened.get("sb-project-auth-token").await.expect("get"), None);
    assert_eq!(reopened.get("auth-backup:session").await.expect("get").as_deref(), Some("{}"));
    assert_eq!(reopened.keys().await.expect("keys"), vec!["auth-backup:session".to_string()]);
}

/// Validates that writes leave no temporary file behind.
#[tokio::test]
async fn test_file_store_write_is_atomic() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("credentials.json");
    let store = FileCredentialStore::new(&path);

    store.set("sb-auth-token", "value").await.expect("set");

    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());
    let raw = std::fs::read_to_string(&path).expect("read back");
    let parsed: serde_json::Value = serde_json::from_str(&raw).expect("valid JSON on disk");
    assert_eq!(parsed["sb-auth-token"], "value");
}

/// Validates that mixing set and remove through the trait object works.
#[tokio::test]
async fn test_factory_selects_backend() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("credentials.json");

    let file_backed = credential_store(&StorageSettings {
        file_path: Some(path.to_string_lossy().into_owned()),
        ..StorageSettings::default()
    });
    file_backed.set("sb-auth-token", "value").await.expect("set");
    assert!(path.exists(), "file path in settings selects the file store");

    let in_memory = credential_store(&StorageSettings::default());
    in_memory.set("sb-auth-token", "value").await.expect("set");
    assert_eq!(in_memory.get("sb-auth-token").await.expect("get").as_deref(), Some("value"));
    in_memory.remove("sb-auth-token").await.expect("remove");
    assert!(in_memory.keys().await.expect("keys").is_empty());
}
