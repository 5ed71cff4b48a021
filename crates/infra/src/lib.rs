//! # UnimogHub Infrastructure
//!
//! Infrastructure implementations of core connectivity ports.
//!
//! This crate contains:
//! - Configuration loading from environment variables and files
//! - Credential store implementations (in-memory and JSON file)
//! - Tracing subscriber initialization
//!
//! ## Architecture
//! - Implements traits defined in `unimoghub-core`
//! - Contains all "impure" code (I/O, environment, global subscribers)

pub mod config;
pub mod observability;
pub mod storage;

// Re-export commonly used items
pub use observability::init_tracing;
pub use storage::{credential_store, FileCredentialStore, InMemoryCredentialStore};
