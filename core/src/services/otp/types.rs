//! Types for verifier results

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::entities::otp_session::{OtpSession, SessionState};

/// Read-only view of the latest session for an identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtpSessionStatus {
    /// Session the status describes
    pub session_id: Uuid,
    /// State at the time of the query
    pub state: SessionState,
    /// Attempts left before exhaustion
    pub remaining_attempts: i32,
    /// When the session expires
    pub expires_at: DateTime<Utc>,
    /// Seconds until expiry, zero once expired
    pub expires_in_seconds: i64,
}

impl OtpSessionStatus {
    pub fn from_session(session: &OtpSession, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session.id,
            state: session.state(now),
            remaining_attempts: session.remaining_attempts(),
            expires_at: session.expires_at,
            expires_in_seconds: session.time_until_expiration(now).num_seconds(),
        }
    }
}
