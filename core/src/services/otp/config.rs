//! Configuration for the OTP verifier

use kl_shared::config::OtpConfig;

use crate::domain::entities::otp_session::{DEFAULT_EXPIRATION_MINUTES, MAX_ATTEMPTS};

/// Configuration for the OTP verifier
#[derive(Debug, Clone)]
pub struct OtpVerifierConfig {
    /// Number of minutes before a session expires
    pub expiration_minutes: i64,
    /// Attempt budget given to new sessions
    pub max_attempts: i32,
    /// Re-reads allowed after losing a compare-and-swap race
    pub max_conflict_retries: u32,
}

impl Default for OtpVerifierConfig {
    fn default() -> Self {
        Self {
            expiration_minutes: DEFAULT_EXPIRATION_MINUTES,
            max_attempts: MAX_ATTEMPTS,
            max_conflict_retries: 3,
        }
    }
}

impl From<&OtpConfig> for OtpVerifierConfig {
    fn from(config: &OtpConfig) -> Self {
        Self {
            expiration_minutes: config.expiration_minutes,
            max_attempts: config.max_attempts,
            max_conflict_retries: config.max_conflict_retries,
        }
    }
}
