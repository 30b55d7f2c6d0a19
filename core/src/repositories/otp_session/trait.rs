//! OTP session store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::otp_session::{OtpSession, VerificationType};
use crate::errors::StoreResult;

/// Expiry condition applied by [`SessionFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryFilter {
    /// No expiry condition
    Any,
    /// `expires_at < at`
    ExpiredAt(DateTime<Utc>),
    /// `expires_at >= at`
    ValidAt(DateTime<Utc>),
}

/// Conditions on sessions returned by [`OtpSessionRepository::find`]
///
/// All set conditions must hold. Identifier and verification type are
/// always matched exactly and are passed separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionFilter {
    /// Match on `is_verified` when set
    pub is_verified: Option<bool>,
    /// Match on `expires_at`
    pub expiry: ExpiryFilter,
    /// Only sessions with `attempts < max_attempts`
    pub attempts_remaining: bool,
}

impl SessionFilter {
    /// Every session for the pair
    pub fn all() -> Self {
        Self {
            is_verified: None,
            expiry: ExpiryFilter::Any,
            attempts_remaining: false,
        }
    }

    /// Sessions not yet verified, regardless of expiry or attempts
    pub fn unverified() -> Self {
        Self {
            is_verified: Some(false),
            ..Self::all()
        }
    }

    /// Sessions that can still be verified at `now`
    pub fn usable(now: DateTime<Utc>) -> Self {
        Self {
            is_verified: Some(false),
            expiry: ExpiryFilter::ValidAt(now),
            attempts_remaining: true,
        }
    }

    /// Sessions that expired before `now`
    pub fn expired(now: DateTime<Utc>) -> Self {
        Self {
            expiry: ExpiryFilter::ExpiredAt(now),
            ..Self::all()
        }
    }

    /// Evaluate the filter against a session
    pub fn matches(&self, session: &OtpSession) -> bool {
        if let Some(verified) = self.is_verified {
            if session.is_verified != verified {
                return false;
            }
        }

        let expiry_ok = match self.expiry {
            ExpiryFilter::Any => true,
            ExpiryFilter::ExpiredAt(at) => session.expires_at < at,
            ExpiryFilter::ValidAt(at) => session.expires_at >= at,
        };

        expiry_ok && (!self.attempts_remaining || session.has_attempts_remaining())
    }
}

/// Repository trait for OTP session persistence
///
/// Implementations carry the concurrency guarantees the verifier relies on:
/// - `insert` atomically refuses a second usable session per
///   `(identifier, verification_type)`
/// - `update` is a compare-and-swap on `version`
///
/// Store calls may block on I/O. Implementations must not retry internally.
#[async_trait]
pub trait OtpSessionRepository: Send + Sync {
    /// Find sessions for the pair matching `filter`
    ///
    /// # Returns
    /// * `Ok(Vec<OtpSession>)` - Newest first: `created_at` descending, then `sequence` descending
    /// * `Err(StoreError)` - Backend failure
    async fn find(
        &self,
        identifier: &str,
        verification_type: VerificationType,
        filter: SessionFilter,
    ) -> StoreResult<Vec<OtpSession>>;

    /// Persist a new session
    ///
    /// A session is usable for this check when it is unverified, has
    /// attempts remaining and `expires_at >= session.created_at`.
    ///
    /// # Returns
    /// * `Ok(OtpSession)` - The stored session with its `sequence` assigned
    /// * `Err(StoreError::Duplicate)` - A usable session already exists for the pair
    async fn insert(&self, session: OtpSession) -> StoreResult<OtpSession>;

    /// Persist the mutable fields of a session (`attempts`, `is_verified`, `verified_at`)
    ///
    /// The write only succeeds if the stored `version` equals `session.version`.
    ///
    /// # Returns
    /// * `Ok(OtpSession)` - The stored session with `version` incremented
    /// * `Err(StoreError::Conflict)` - The version changed, or the stored session is already verified
    /// * `Err(StoreError::Missing)` - No session with this id
    async fn update(&self, session: OtpSession) -> StoreResult<OtpSession>;

    /// Delete the pair's sessions that expired before `now`
    ///
    /// # Returns
    /// * `Ok(u64)` - Number of sessions deleted
    async fn delete_expired(
        &self,
        identifier: &str,
        verification_type: VerificationType,
        now: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Delete every session that expired before `before`
    ///
    /// # Returns
    /// * `Ok(u64)` - Number of sessions deleted
    async fn purge_expired(&self, before: DateTime<Utc>) -> StoreResult<u64>;

    /// Latest session for the pair, if any
    async fn find_latest(
        &self,
        identifier: &str,
        verification_type: VerificationType,
        filter: SessionFilter,
    ) -> StoreResult<Option<OtpSession>> {
        let sessions = self.find(identifier, verification_type, filter).await?;
        Ok(sessions
            .into_iter()
            .max_by_key(|s| (s.created_at, s.sequence)))
    }
}
