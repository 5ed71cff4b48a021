//! Credential store implementations

pub mod file;
pub mod memory;

use std::sync::Arc;

use unimoghub_core::CredentialStore;
use unimoghub_domain::StorageSettings;

pub use file::FileCredentialStore;
pub use memory::InMemoryCredentialStore;

/// File-backed store when `file_path` is configured, in-memory otherwise
pub fn credential_store(settings: &StorageSettings) -> Arc<dyn CredentialStore> {
    match settings.file_path.as_deref() {
        Some(path) => {
            tracing::info!(path, "Using file credential store");
            Arc::new(FileCredentialStore::new(path))
        }
        None => {
            tracing::info!("Using in-memory credential store");
            Arc::new(InMemoryCredentialStore::new())
        }
    }
}
