//! One-time passcode session entity.

use chrono::{DateTime, Duration, DurationRound, Utc};
use constant_time_eq::constant_time_eq;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::OtpError;

/// Maximum number of verification attempts allowed per session
pub const MAX_ATTEMPTS: i32 = 3;

/// Length of the passcode
pub const CODE_LENGTH: usize = 6;

/// Default lifetime of a session (30 minutes)
pub const DEFAULT_EXPIRATION_MINUTES: i64 = 30;

/// Truncates `at` to whole microseconds, the finest precision every store keeps
pub fn to_store_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(Duration::microseconds(1)).unwrap_or(at)
}

/// What the passcode is proving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationType {
    Email,
    Phone,
    Login,
    PasswordReset,
}

impl VerificationType {
    /// Stable storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationType::Email => "email",
            VerificationType::Phone => "phone",
            VerificationType::Login => "login",
            VerificationType::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for VerificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(VerificationType::Email),
            "phone" => Ok(VerificationType::Phone),
            "login" => Ok(VerificationType::Login),
            "password_reset" => Ok(VerificationType::PasswordReset),
            _ => Err(format!("Invalid verification type: {}", s)),
        }
    }
}

/// How the identifier is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Email,
    Phone,
}

impl IdentifierKind {
    /// Infer the kind from the identifier's shape: anything containing `@` is an email
    pub fn infer(identifier: &str) -> Self {
        if kl_shared::identifier::is_email_shaped(identifier) {
            IdentifierKind::Email
        } else {
            IdentifierKind::Phone
        }
    }

    /// Stable storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Email => "email",
            IdentifierKind::Phone => "phone",
        }
    }
}

impl FromStr for IdentifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(IdentifierKind::Email),
            "phone" => Ok(IdentifierKind::Phone),
            _ => Err(format!("Invalid identifier kind: {}", s)),
        }
    }
}

/// Observable state of a session at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Unverified, unexpired, attempts remaining
    Active,
    /// Attempt budget spent
    AttemptsExhausted,
    /// Past `expires_at`
    Expired,
    /// Successfully verified (terminal)
    Verified,
}

/// Result of a charged verification attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The code matched and the session is now verified
    Verified,
    /// The code did not match
    Mismatch { remaining_attempts: i32 },
}

/// One outstanding or resolved passcode challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpSession {
    /// Unique identifier for the session
    pub id: Uuid,

    /// Email address or phone number the code was issued for
    pub identifier: String,

    /// Interpretation of `identifier`, fixed at creation
    pub identifier_kind: IdentifierKind,

    /// Purpose of the challenge
    pub verification_type: VerificationType,

    /// The 6-digit passcode, zero-padded
    pub code: String,

    /// Timestamp when the session was created
    pub created_at: DateTime<Utc>,

    /// Timestamp after which the session can no longer be verified
    pub expires_at: DateTime<Utc>,

    /// Timestamp of the successful verification, if any
    pub verified_at: Option<DateTime<Utc>>,

    /// Whether the session has been verified
    pub is_verified: bool,

    /// Number of charged verification attempts
    pub attempts: i32,

    /// Attempt budget, fixed for the session's lifetime
    pub max_attempts: i32,

    /// Store-assigned insertion sequence; breaks `created_at` ties
    pub sequence: i64,

    /// Optimistic concurrency version, bumped by the store on each update
    pub version: i64,
}

impl OtpSession {
    /// Creates a new unverified session
    ///
    /// # Arguments
    ///
    /// * `identifier` - Email address or phone number
    /// * `verification_type` - Purpose of the challenge
    /// * `code` - The passcode to issue
    /// * `now` - Creation time, truncated to whole microseconds
    /// * `lifetime` - Time until the session expires
    /// * `max_attempts` - Attempt budget
    pub fn new(
        identifier: impl Into<String>,
        verification_type: VerificationType,
        code: impl Into<String>,
        now: DateTime<Utc>,
        lifetime: Duration,
        max_attempts: i32,
    ) -> Self {
        let identifier = identifier.into();
        let identifier_kind = IdentifierKind::infer(&identifier);
        let now = to_store_precision(now);

        Self {
            id: Uuid::new_v4(),
            identifier,
            identifier_kind,
            verification_type,
            code: code.into(),
            created_at: now,
            expires_at: to_store_precision(now + lifetime),
            verified_at: None,
            is_verified: false,
            attempts: 0,
            max_attempts,
            sequence: 0,
            version: 0,
        }
    }

    /// Checks if the session has expired at `now`
    ///
    /// A session is still valid at exactly `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether another attempt may be charged
    pub fn has_attempts_remaining(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Whether the session can still be verified at `now`
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.is_verified && !self.is_expired(now) && self.has_attempts_remaining()
    }

    /// State of the session at `now`
    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        if self.is_verified {
            SessionState::Verified
        } else if self.is_expired(now) {
            SessionState::Expired
        } else if !self.has_attempts_remaining() {
            SessionState::AttemptsExhausted
        } else {
            SessionState::Active
        }
    }

    /// Gets the number of remaining verification attempts (0 if exhausted)
    pub fn remaining_attempts(&self) -> i32 {
        (self.max_attempts - self.attempts).max(0)
    }

    /// Time remaining until expiration, or zero if expired
    pub fn time_until_expiration(&self, now: DateTime<Utc>) -> Duration {
        if self.expires_at > now {
            self.expires_at - now
        } else {
            Duration::zero()
        }
    }

    /// Charges one attempt and compares `candidate` against the stored code
    ///
    /// Guards run before any mutation: a verified, expired or exhausted
    /// session returns an error and is left untouched. Otherwise `attempts`
    /// is incremented whether or not the code matches.
    pub fn attempt(&mut self, candidate: &str, now: DateTime<Utc>) -> Result<AttemptOutcome, OtpError> {
        if self.is_verified {
            return Err(OtpError::AlreadyVerified);
        }

        if self.is_expired(now) {
            return Err(OtpError::Expired);
        }

        if !self.has_attempts_remaining() {
            return Err(OtpError::AttemptsExhausted);
        }

        self.attempts += 1;

        if constant_time_eq(self.code.as_bytes(), candidate.as_bytes()) {
            self.is_verified = true;
            self.verified_at = Some(to_store_precision(now));
            Ok(AttemptOutcome::Verified)
        } else {
            Ok(AttemptOutcome::Mismatch {
                remaining_attempts: self.remaining_attempts(),
            })
        }
    }
}

/// Whether `code` is exactly [`CODE_LENGTH`] ASCII digits
pub fn is_well_formed_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}
