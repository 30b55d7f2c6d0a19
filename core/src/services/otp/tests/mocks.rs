//! Test doubles for the OTP verifier

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::domain::entities::otp_session::{OtpSession, VerificationType};
use crate::errors::{StoreError, StoreResult};
use crate::repositories::{InMemoryOtpSessionRepository, OtpSessionRepository, SessionFilter};
use crate::services::otp::CodeGenerator;

/// Hands out a fixed list of codes in order
pub struct SequenceCodeGenerator {
    codes: Mutex<VecDeque<String>>,
    calls: AtomicU32,
}

impl SequenceCodeGenerator {
    pub fn new(codes: &[&str]) -> Self {
        Self {
            codes: Mutex::new(codes.iter().map(|c| c.to_string()).collect()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CodeGenerator for SequenceCodeGenerator {
    fn generate(&self) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.codes
            .lock()
            .unwrap()
            .pop_front()
            .expect("SequenceCodeGenerator ran out of codes")
    }
}

/// Every call fails with a backend error
pub struct FailingRepository;

#[async_trait]
impl OtpSessionRepository for FailingRepository {
    async fn find(
        &self,
        _identifier: &str,
        _verification_type: VerificationType,
        _filter: SessionFilter,
    ) -> StoreResult<Vec<OtpSession>> {
        Err(StoreError::backend("connection refused"))
    }

    async fn insert(&self, _session: OtpSession) -> StoreResult<OtpSession> {
        Err(StoreError::backend("connection refused"))
    }

    async fn update(&self, _session: OtpSession) -> StoreResult<OtpSession> {
        Err(StoreError::backend("connection refused"))
    }

    async fn delete_expired(
        &self,
        _identifier: &str,
        _verification_type: VerificationType,
        _now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        Err(StoreError::backend("connection refused"))
    }

    async fn purge_expired(&self, _before: DateTime<Utc>) -> StoreResult<u64> {
        Err(StoreError::backend("connection refused"))
    }
}

/// Wraps the in-memory store, reporting a conflict on the first
/// `conflicts` updates without writing anything
pub struct ConflictingRepository {
    pub inner: InMemoryOtpSessionRepository,
    conflicts: u32,
    update_calls: AtomicU32,
}

impl ConflictingRepository {
    pub fn new(conflicts: u32) -> Self {
        Self {
            inner: InMemoryOtpSessionRepository::new(),
            conflicts,
            update_calls: AtomicU32::new(0),
        }
    }

    pub fn update_calls(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OtpSessionRepository for ConflictingRepository {
    async fn find(
        &self,
        identifier: &str,
        verification_type: VerificationType,
        filter: SessionFilter,
    ) -> StoreResult<Vec<OtpSession>> {
        self.inner.find(identifier, verification_type, filter).await
    }

    async fn insert(&self, session: OtpSession) -> StoreResult<OtpSession> {
        self.inner.insert(session).await
    }

    async fn update(&self, session: OtpSession) -> StoreResult<OtpSession> {
        let call = self.update_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.conflicts {
            return Err(StoreError::Conflict);
        }
        self.inner.update(session).await
    }

    async fn delete_expired(
        &self,
        identifier: &str,
        verification_type: VerificationType,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        self.inner.delete_expired(identifier, verification_type, now).await
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        self.inner.purge_expired(before).await
    }
}

/// Wraps the in-memory store but never sees existing sessions on `find`,
/// like a request that read just before a concurrent insert landed
pub struct StaleReadRepository {
    pub inner: InMemoryOtpSessionRepository,
}

#[async_trait]
impl OtpSessionRepository for StaleReadRepository {
    async fn find(
        &self,
        _identifier: &str,
        _verification_type: VerificationType,
        _filter: SessionFilter,
    ) -> StoreResult<Vec<OtpSession>> {
        Ok(Vec::new())
    }

    async fn insert(&self, session: OtpSession) -> StoreResult<OtpSession> {
        self.inner.insert(session).await
    }

    async fn update(&self, session: OtpSession) -> StoreResult<OtpSession> {
        self.inner.update(session).await
    }

    async fn delete_expired(
        &self,
        identifier: &str,
        verification_type: VerificationType,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        self.inner.delete_expired(identifier, verification_type, now).await
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        self.inner.purge_expired(before).await
    }
}
