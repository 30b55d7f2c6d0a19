//! MySQL implementation of the OtpSessionRepository trait.
//!
//! Sessions live in `otp_sessions`. Inserts serialize per
//! `(identifier, verification_type)` on a row in `otp_session_locks`, so two
//! concurrent inserts cannot both see "no usable session". Updates are a
//! compare-and-swap on the `version` column. `purge_expired` drops lock rows
//! whose pair has no sessions left.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row};
use uuid::Uuid;

use kl_core::domain::entities::{OtpSession, VerificationType};
use kl_core::errors::{StoreError, StoreResult};
use kl_core::repositories::{ExpiryFilter, OtpSessionRepository, SessionFilter};

const SESSION_COLUMNS: &str = "seq, id, identifier, identifier_kind, verification_type, code, \
     created_at, expires_at, verified_at, is_verified, attempts, max_attempts, version";

/// MySQL implementation of OtpSessionRepository
pub struct MySqlOtpSessionRepository {
    /// Database connection pool
    pool: MySqlPool,
}

impl MySqlOtpSessionRepository {
    /// Create a new MySQL session repository
    ///
    /// # Arguments
    /// * `pool` - MySQL connection pool from SQLx
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Build the SELECT for a pair and filter, newest first
    fn select_query<'a>(
        identifier: &'a str,
        verification_type: VerificationType,
        filter: SessionFilter,
    ) -> QueryBuilder<'a, MySql> {
        let mut query = QueryBuilder::new("SELECT ");
        query
            .push(SESSION_COLUMNS)
            .push(" FROM otp_sessions WHERE identifier = ")
            .push_bind(identifier)
            .push(" AND verification_type = ")
            .push_bind(verification_type.as_str());

        if let Some(verified) = filter.is_verified {
            query.push(" AND is_verified = ").push_bind(verified);
        }

        match filter.expiry {
            ExpiryFilter::Any => {}
            ExpiryFilter::ExpiredAt(at) => {
                query.push(" AND expires_at < ").push_bind(at);
            }
            ExpiryFilter::ValidAt(at) => {
                query.push(" AND expires_at >= ").push_bind(at);
            }
        }

        if filter.attempts_remaining {
            query.push(" AND attempts < max_attempts");
        }

        query.push(" ORDER BY created_at DESC, seq DESC");
        query
    }

    /// Convert database row to OtpSession entity
    fn row_to_session(row: &MySqlRow) -> StoreResult<OtpSession> {
        let id: String = column(row, "id")?;
        let identifier_kind: String = column(row, "identifier_kind")?;
        let verification_type: String = column(row, "verification_type")?;

        Ok(OtpSession {
            id: Uuid::parse_str(&id).map_err(StoreError::backend)?,
            identifier: column(row, "identifier")?,
            identifier_kind: identifier_kind.parse().map_err(StoreError::backend)?,
            verification_type: verification_type.parse().map_err(StoreError::backend)?,
            code: column(row, "code")?,
            created_at: column(row, "created_at")?,
            expires_at: column(row, "expires_at")?,
            verified_at: column(row, "verified_at")?,
            is_verified: column(row, "is_verified")?,
            attempts: column(row, "attempts")?,
            max_attempts: column(row, "max_attempts")?,
            sequence: column(row, "seq")?,
            version: column(row, "version")?,
        })
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<OtpSession>> {
        let query = format!("SELECT {} FROM otp_sessions WHERE id = ?", SESSION_COLUMNS);

        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        row.as_ref().map(Self::row_to_session).transpose()
    }
}

fn column<'r, T>(row: &'r MySqlRow, name: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, MySql> + sqlx::Type<MySql>,
{
    row.try_get(name)
        .map_err(|e| StoreError::backend(format!("Failed to get {}: {}", name, e)))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl OtpSessionRepository for MySqlOtpSessionRepository {
    async fn find(
        &self,
        identifier: &str,
        verification_type: VerificationType,
        filter: SessionFilter,
    ) -> StoreResult<Vec<OtpSession>> {
        let rows = Self::select_query(identifier, verification_type, filter)
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        rows.iter().map(Self::row_to_session).collect()
    }

    async fn find_latest(
        &self,
        identifier: &str,
        verification_type: VerificationType,
        filter: SessionFilter,
    ) -> StoreResult<Option<OtpSession>> {
        let mut query = Self::select_query(identifier, verification_type, filter);
        query.push(" LIMIT 1");

        let row = query
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn insert(&self, mut session: OtpSession) -> StoreResult<OtpSession> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        // Row lock on the pair, held until commit or rollback
        sqlx::query(
            "INSERT INTO otp_session_locks (identifier, verification_type) VALUES (?, ?) \
             ON DUPLICATE KEY UPDATE identifier = identifier",
        )
        .bind(&session.identifier)
        .bind(session.verification_type.as_str())
        .execute(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        let usable: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM otp_sessions \
             WHERE identifier = ? AND verification_type = ? \
               AND is_verified = FALSE AND expires_at >= ? AND attempts < max_attempts",
        )
        .bind(&session.identifier)
        .bind(session.verification_type.as_str())
        .bind(session.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        if usable > 0 {
            tx.rollback().await.map_err(StoreError::backend)?;
            return Err(StoreError::Duplicate);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO otp_sessions (
                id, identifier, identifier_kind, verification_type, code,
                created_at, expires_at, verified_at, is_verified,
                attempts, max_attempts, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.id.to_string())
        .bind(&session.identifier)
        .bind(session.identifier_kind.as_str())
        .bind(session.verification_type.as_str())
        .bind(&session.code)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.verified_at)
        .bind(session.is_verified)
        .bind(session.attempts)
        .bind(session.max_attempts)
        .bind(session.version)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate
            } else {
                StoreError::backend(e)
            }
        })?;

        tx.commit().await.map_err(StoreError::backend)?;

        session.sequence = result.last_insert_id() as i64;

        tracing::debug!(
            session_id = %session.id,
            sequence = session.sequence,
            "Inserted OTP session"
        );

        Ok(session)
    }

    async fn update(&self, mut session: OtpSession) -> StoreResult<OtpSession> {
        let result = sqlx::query(
            r#"
            UPDATE otp_sessions
            SET attempts = ?, is_verified = ?, verified_at = ?, version = version + 1
            WHERE id = ? AND version = ? AND is_verified = FALSE
            "#,
        )
        .bind(session.attempts)
        .bind(session.is_verified)
        .bind(session.verified_at)
        .bind(session.id.to_string())
        .bind(session.version)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            return match self.find_by_id(session.id).await? {
                Some(_) => Err(StoreError::Conflict),
                None => Err(StoreError::Missing { id: session.id }),
            };
        }

        session.version += 1;
        Ok(session)
    }

    async fn delete_expired(
        &self,
        identifier: &str,
        verification_type: VerificationType,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM otp_sessions \
             WHERE identifier = ? AND verification_type = ? AND expires_at < ?",
        )
        .bind(identifier)
        .bind(verification_type.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        let sessions = sqlx::query("DELETE FROM otp_sessions WHERE expires_at < ?")
            .bind(before)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;

        // Lock rows for pairs with no sessions left
        let locks = sqlx::query(
            r#"
            DELETE l FROM otp_session_locks l
            LEFT JOIN otp_sessions s
              ON s.identifier = l.identifier AND s.verification_type = l.verification_type
            WHERE s.seq IS NULL
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        tx.commit().await.map_err(StoreError::backend)?;

        tracing::debug!(
            sessions = sessions.rows_affected(),
            locks = locks.rows_affected(),
            "Purged expired OTP sessions"
        );

        Ok(sessions.rows_affected())
    }
}
