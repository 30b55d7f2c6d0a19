//! Domain entities representing core business objects.

pub mod otp_session;


// Re-export commonly used types
pub use otp_session::{
    is_well_formed_code, to_store_precision, AttemptOutcome, IdentifierKind, OtpSession,
    SessionState, VerificationType, CODE_LENGTH, DEFAULT_EXPIRATION_MINUTES, MAX_ATTEMPTS,
};
