pub mod otp_session;

pub use otp_session::{ExpiryFilter, InMemoryOtpSessionRepository, OtpSessionRepository, SessionFilter};
