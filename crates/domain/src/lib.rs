//! # UnimogHub Domain
//!
//! Connectivity domain types for UnimogHub.
//!
//! This crate contains:
//! - Connectivity configuration and its defaults
//! - The remote error shape and its single classifier into [`ErrorKind`]
//! - Session, token and recovery state types
//! - Event, metric and query/mutation types
//!
//! ## Architecture
//! - No dependencies on other UnimogHub crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
