//! Recovery state types

use serde::{Deserialize, Serialize};

use crate::impl_wire_name_conversions;

/// Recovery gate phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryPhase {
    Idle,
    Recovering,
    CircuitOpen,
}

impl_wire_name_conversions!(RecoveryPhase {
    Idle => "IDLE",
    Recovering => "RECOVERING",
    CircuitOpen => "CIRCUIT_OPEN",
});

/// Recovery strategies, in the order they are attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    PurgeExpiredCredentials,
    ValidateEnvironment,
    RefreshSession,
    ResetAuthState,
    RestoreBackup,
}

impl_wire_name_conversions!(RecoveryStrategy {
    PurgeExpiredCredentials => "purge_expired_credentials",
    ValidateEnvironment => "validate_environment",
    RefreshSession => "refresh_session",
    ResetAuthState => "reset_auth_state",
    RestoreBackup => "restore_backup",
});

impl RecoveryStrategy {
    pub const ALL: [Self; 5] = [
        Self::PurgeExpiredCredentials,
        Self::ValidateEnvironment,
        Self::RefreshSession,
        Self::ResetAuthState,
        Self::RestoreBackup,
    ];
}

/// Snapshot of the recovery orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStats {
    pub phase: RecoveryPhase,
    pub attempt_count: u32,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_attempt_ms: Option<i64>,
    pub circuit_opened_at_ms: Option<i64>,
    pub environment_check_passed: bool,
    pub pending_operations: usize,
    pub retry_scheduled: bool,
}
