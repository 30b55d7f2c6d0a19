//! Process-local implementation of OtpSessionRepository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::entities::otp_session::{OtpSession, VerificationType};
use crate::errors::{StoreError, StoreResult};

use super::r#trait::{OtpSessionRepository, SessionFilter};

#[derive(Default)]
struct State {
    sessions: HashMap<Uuid, OtpSession>,
    next_sequence: i64,
}

/// In-memory session store
///
/// Every mutating call holds the write lock for its whole check-then-write,
/// which gives `insert` and `update` their atomicity. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryOtpSessionRepository {
    state: Arc<RwLock<State>>,
}

impl InMemoryOtpSessionRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, expired ones included
    pub async fn len(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Whether no sessions are stored
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn same_pair(session: &OtpSession, identifier: &str, verification_type: VerificationType) -> bool {
    session.identifier == identifier && session.verification_type == verification_type
}

#[async_trait]
impl OtpSessionRepository for InMemoryOtpSessionRepository {
    async fn find(
        &self,
        identifier: &str,
        verification_type: VerificationType,
        filter: SessionFilter,
    ) -> StoreResult<Vec<OtpSession>> {
        let state = self.state.read().await;

        let mut found: Vec<OtpSession> = state
            .sessions
            .values()
            .filter(|s| same_pair(s, identifier, verification_type) && filter.matches(s))
            .cloned()
            .collect();

        found.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.sequence.cmp(&a.sequence))
        });

        Ok(found)
    }

    async fn insert(&self, mut session: OtpSession) -> StoreResult<OtpSession> {
        let mut state = self.state.write().await;

        let usable_exists = state.sessions.values().any(|s| {
            same_pair(s, &session.identifier, session.verification_type)
                && s.is_usable(session.created_at)
        });

        if usable_exists || state.sessions.contains_key(&session.id) {
            return Err(StoreError::Duplicate);
        }

        state.next_sequence += 1;
        session.sequence = state.next_sequence;
        state.sessions.insert(session.id, session.clone());

        Ok(session)
    }

    async fn update(&self, session: OtpSession) -> StoreResult<OtpSession> {
        let mut state = self.state.write().await;

        let stored = state
            .sessions
            .get_mut(&session.id)
            .ok_or(StoreError::Missing { id: session.id })?;

        if stored.version != session.version || stored.is_verified {
            return Err(StoreError::Conflict);
        }

        stored.attempts = session.attempts;
        stored.is_verified = session.is_verified;
        stored.verified_at = session.verified_at;
        stored.version += 1;

        Ok(stored.clone())
    }

    async fn delete_expired(
        &self,
        identifier: &str,
        verification_type: VerificationType,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();

        state
            .sessions
            .retain(|_, s| !(same_pair(s, identifier, verification_type) && s.expires_at < now));

        Ok((before - state.sessions.len()) as u64)
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let count = state.sessions.len();

        state.sessions.retain(|_, s| s.expires_at >= before);

        Ok((count - state.sessions.len()) as u64)
    }
}
