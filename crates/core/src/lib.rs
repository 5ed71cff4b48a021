//! # UnimogHub Core
//!
//! Connectivity business logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces for the backend client and local credential storage
//! - Token lifecycle management (proactive, retried and fallback refresh)
//! - Multi-strategy auth recovery with its own gate and deferred queue
//! - The connectivity facade routing data calls through breaker and retry
//! - The explicit context that wires everything together
//!
//! ## Architecture Principles
//! - Only depends on `unimoghub-common` and `unimoghub-domain`
//! - No HTTP, storage or platform code
//! - All external dependencies via traits
//! - Time flows through an injectable clock

pub mod auth;
pub mod context;
pub mod error;
pub mod facade;
pub mod recovery;

// Infrastructure ports
pub mod credential_ports;

// Re-export specific items to avoid ambiguity
pub use auth::ports::AuthClient;
pub use auth::TokenLifecycleManager;
pub use context::{ConnectivityContext, ContextPorts};
pub use credential_ports::CredentialStore;
pub use error::{ConnectivityError, ConnectivityResult};
pub use facade::ports::ResourceClient;
pub use facade::{ConnectivityFacade, HealthReport, Response};
pub use recovery::{RecoveryOrchestrator, RecoveryOutcome, SkipReason};
