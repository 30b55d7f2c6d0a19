//! # Koluvu Core
//!
//! Core business logic for Koluvu one-time passcode verification.
//! This crate contains the OTP session entity, the session store contract
//! with an in-memory implementation, the verifier and cleanup services,
//! and the error types shared by every store backend.

pub mod domain;
pub mod errors;
pub mod repositories;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::entities::{
    IdentifierKind, OtpSession, SessionState, VerificationType, CODE_LENGTH, MAX_ATTEMPTS,
};
pub use errors::{ErrorResponse, OtpError, OtpResult, StoreError, StoreResult};
pub use repositories::{InMemoryOtpSessionRepository, OtpSessionRepository, SessionFilter};
pub use services::otp::{
    Clock, CodeGenerator, OtpCleanupService, OtpSessionStatus, OtpVerifier, OtpVerifierConfig,
    SystemClock,
};
