//! Domain-specific error types and error handling.

mod types;

#[cfg(test)]
mod tests;

pub use types::ErrorResponse;

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by OTP session stores
#[derive(Error, Debug)]
pub enum StoreError {
    /// A usable session already exists for the identifier and type
    #[error("A usable OTP session already exists for this identifier")]
    Duplicate,

    /// The session's version changed since it was read
    #[error("OTP session was modified concurrently")]
    Conflict,

    /// The session to update does not exist
    #[error("OTP session not found: {id}")]
    Missing { id: Uuid },

    /// The backend failed (I/O, protocol, decoding)
    #[error("Storage backend error: {message}")]
    Backend { message: String },
}

impl StoreError {
    /// Wrap any backend failure
    pub fn backend(err: impl std::fmt::Display) -> Self {
        StoreError::Backend {
            message: err.to_string(),
        }
    }
}

/// Errors returned by the OTP verifier
///
/// Every variant is a distinct user-facing outcome; none is retried
/// inside the verifier except [`OtpError::Conflict`], which is only
/// returned once the conflict retry budget is spent.
#[derive(Error, Debug)]
pub enum OtpError {
    #[error("Invalid identifier: {reason}")]
    InvalidIdentifier { reason: String },

    #[error("No pending verification code for this identifier")]
    NotFound,

    #[error("Verification code expired")]
    Expired,

    #[error("Maximum attempts exceeded. Please request a new code")]
    AttemptsExhausted,

    #[error("Invalid verification code. {remaining_attempts} attempt(s) remaining")]
    InvalidCode { remaining_attempts: i32 },

    #[error("Verification code has already been used")]
    AlreadyVerified,

    /// A concurrent request created a session first; retrying `create_session` reuses it
    #[error("A verification code is already being issued. Please retry")]
    Duplicate,

    #[error("Verification is already in progress. Please retry")]
    Conflict,

    #[error(transparent)]
    Store(StoreError),
}

impl OtpError {
    /// Stable machine-readable code for the calling layer
    pub fn error_code(&self) -> &'static str {
        match self {
            OtpError::InvalidIdentifier { .. } => "INVALID_IDENTIFIER",
            OtpError::NotFound => "OTP_NOT_FOUND",
            OtpError::Expired => "OTP_EXPIRED",
            OtpError::AttemptsExhausted => "OTP_ATTEMPTS_EXHAUSTED",
            OtpError::InvalidCode { .. } => "OTP_INVALID_CODE",
            OtpError::AlreadyVerified => "OTP_ALREADY_VERIFIED",
            OtpError::Duplicate => "OTP_DUPLICATE_SESSION",
            OtpError::Conflict => "OTP_CONCURRENT_VERIFICATION",
            OtpError::Store(_) => "OTP_STORE_ERROR",
        }
    }

    /// Whether the caller may simply retry the same request
    pub fn is_transient(&self) -> bool {
        matches!(self, OtpError::Duplicate | OtpError::Conflict | OtpError::Store(_))
    }
}

impl From<StoreError> for OtpError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => OtpError::Duplicate,
            StoreError::Conflict => OtpError::Conflict,
            other => OtpError::Store(other),
        }
    }
}

pub type OtpResult<T> = Result<T, OtpError>;
pub type StoreResult<T> = Result<T, StoreError>;
