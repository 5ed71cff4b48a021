//! Connectivity constants
//!
//! Centralized location for the defaults shared by configuration and the
//! components that consume it.

// Backend
pub const DEFAULT_HEALTH_RESOURCE: &str = "profiles";
pub const SIGNED_KEY_PREFIX: &str = "eyJ";

// Circuit breaker
pub const DEFAULT_FAILURE_THRESHOLD: u64 = 5;
pub const DEFAULT_BREAKER_COOLDOWN_MS: u64 = 60_000;

// Request retries
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 10_000;
pub const DEFAULT_JITTER_RATIO: f64 = 0.1;

// Token lifecycle
pub const DEFAULT_REFRESH_BUFFER_MINUTES: u64 = 5;
pub const DEFAULT_MIN_REFRESH_DELAY_MS: u64 = 10_000;
pub const DEFAULT_MAX_REFRESH_ATTEMPTS: u32 = 3;
pub const DEFAULT_REFRESH_RETRY_BASE_MS: u64 = 1_000;
pub const DEFAULT_REFRESH_RETRY_MAX_MS: u64 = 30_000;
pub const DEFAULT_FALLBACK_INTERVAL_MS: u64 = 30 * 60 * 1_000;
pub const DEFAULT_FALLBACK_MIN_SPACING_MS: u64 = 5 * 60 * 1_000;
pub const DEFAULT_VALIDITY_BUFFER_MS: u64 = 60_000;

// Recovery
pub const DEFAULT_RECOVERY_THRESHOLD: u32 = 10;
pub const DEFAULT_RECOVERY_COOLDOWN_MS: u64 = 300_000;
pub const DEFAULT_RECOVERY_BASE_DELAY_MS: u64 = 100;
pub const DEFAULT_RECOVERY_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;
pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 30_000;

// Local credential storage
pub const DEFAULT_CREDENTIAL_NAMESPACE: &str = "sb-";
pub const DEFAULT_BACKUP_KEY: &str = "auth-backup:session";

// Metrics
pub const DEFAULT_METRICS_HISTORY: usize = 1_000;

// Recovery reasons
pub const REASON_TOKEN_REFRESH_FAILED: &str = "token_refresh_failed";
pub const REASON_API_KEY_INVALID: &str = "api_key_invalid";
pub const REASON_AUTH_EXPIRED: &str = "auth_expired";
pub const REASON_REFRESH_WITHOUT_SESSION: &str = "token_refreshed_without_session";
