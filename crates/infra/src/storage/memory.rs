//! Process-local credential store

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use unimoghub_common::CommonResult;
use unimoghub_core::CredentialStore;

/// Credential store that lives only as long as the process
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, key: &str) -> CommonResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> CommonResult<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> CommonResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn keys(&self) -> CommonResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}
