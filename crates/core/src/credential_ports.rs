//! Port interface for local credential storage
//!
//! The backend client caches its session under a key namespace (default
//! `sb-`); recovery purges and resets entries there and keeps its own backup
//! slot outside of it.

use async_trait::async_trait;
use unimoghub_common::CommonResult;

/// Local persistent key-value store for credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read a value; `None` when the key is absent
    async fn get(&self, key: &str) -> CommonResult<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> CommonResult<()>;

    /// Remove a key; removing an absent key is not an error
    async fn remove(&self, key: &str) -> CommonResult<()>;

    /// Every key currently stored
    async fn keys(&self) -> CommonResult<Vec<String>>;
}
