//! OTP session lifecycle configuration

use serde::{Deserialize, Serialize};

/// Backend used to persist OTP sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store, for development and tests
    #[default]
    Memory,
    /// MySQL via sqlx
    Mysql,
    /// Redis
    Redis,
}

/// Configuration for OTP sessions
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OtpConfig {
    /// Minutes a session stays valid after creation
    pub expiration_minutes: i64,

    /// Verification attempts allowed per session
    pub max_attempts: i32,

    /// Re-reads allowed when a concurrent verify updates the same session
    pub max_conflict_retries: u32,

    /// Where sessions are stored
    pub store: StoreBackend,

    /// Periodic purge of expired sessions
    pub cleanup: CleanupConfig,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            expiration_minutes: 30,
            max_attempts: 3,
            max_conflict_retries: 3,
            store: StoreBackend::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

/// Configuration for the expired-session cleanup job
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Whether the cleanup job runs
    pub enabled: bool,

    /// How often to run cleanup (in seconds)
    pub interval_seconds: u64,

    /// How long expired sessions are retained before deletion (in minutes)
    pub grace_period_minutes: i64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 3600,
            grace_period_minutes: 60,
        }
    }
}
