//! Port interface for the backend data API

use async_trait::async_trait;
use serde_json::Value;
use unimoghub_domain::{Mutation, QuerySpec, RemoteError};

/// Trait for reading and writing backend resources
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Run a read against `resource`
    async fn select(&self, resource: &str, query: &QuerySpec) -> Result<Value, RemoteError>;

    /// Apply a write to `resource`
    async fn mutate(&self, resource: &str, mutation: &Mutation) -> Result<Value, RemoteError>;
}
