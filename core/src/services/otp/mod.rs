//! OTP session lifecycle
//!
//! This module provides the passcode challenge workflow:
//! - Session creation with reuse of an active session per identifier
//! - Attempt-limited verification with compare-and-swap persistence
//! - Injectable clock and code generator seams
//! - Periodic purge of expired sessions

mod cleanup;
mod clock;
mod code_generator;
mod config;
mod service;
mod types;

#[cfg(test)]
mod tests;

pub use cleanup::{CleanupResult, OtpCleanupService};
pub use clock::{Clock, ManualClock, SystemClock};
pub use code_generator::{CodeGenerator, RandomCodeGenerator};
pub use config::OtpVerifierConfig;
pub use service::OtpVerifier;
pub use types::OtpSessionStatus;
