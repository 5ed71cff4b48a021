//! Auth recovery orchestration

pub mod orchestrator;
mod strategies;

pub use orchestrator::{RecoveryOrchestrator, RecoveryOutcome, SkipReason};
