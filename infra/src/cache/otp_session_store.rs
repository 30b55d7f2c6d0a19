//! Redis implementation of the OtpSessionRepository trait.
//!
//! Key layout, all under the configured prefix:
//! - `{prefix}:otp:session:{id}` - hash holding one session
//! - `{prefix}:otp:index:{type}:{identifier}` - set of session ids for a pair
//! - `{prefix}:otp:expiry` - sorted set of session ids scored by `expires_at`
//! - `{prefix}:otp:seq` - insertion sequence counter
//!
//! Timestamps are stored as Unix microseconds. Every write that must be
//! atomic (duplicate-checked insert, version compare-and-swap, deletes that
//! touch several keys) runs as a Lua script.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use kl_core::domain::entities::{OtpSession, VerificationType};
use kl_core::errors::{StoreError, StoreResult};
use kl_core::repositories::{OtpSessionRepository, SessionFilter};

use super::redis_client::RedisClient;

/// Returns the new sequence, or -1 if a usable session already exists
const INSERT_SCRIPT: &str = r#"
local session_prefix = ARGV[1]
local created_at_us = tonumber(ARGV[3])
for _, sid in ipairs(redis.call('SMEMBERS', KEYS[1])) do
    local s = redis.call('HMGET', session_prefix .. sid, 'is_verified', 'expires_at_us', 'attempts', 'max_attempts')
    if s[1] then
        if s[1] == '0' and tonumber(s[2]) >= created_at_us and tonumber(s[3]) < tonumber(s[4]) then
            return -1
        end
    else
        redis.call('SREM', KEYS[1], sid)
    end
end
local key = session_prefix .. ARGV[2]
if redis.call('EXISTS', key) == 1 then
    return -1
end
local seq = redis.call('INCR', KEYS[2])
redis.call('HSET', key, unpack(ARGV, 6))
redis.call('HSET', key, 'sequence', seq)
redis.call('PEXPIRE', key, ARGV[4])
redis.call('SADD', KEYS[1], ARGV[2])
redis.call('ZADD', KEYS[3], ARGV[5], ARGV[2])
return seq
"#;

/// Returns the new version, -1 on a version mismatch or verified session, -2 if missing
const UPDATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -2
end
local s = redis.call('HMGET', KEYS[1], 'version', 'is_verified')
if s[1] ~= ARGV[1] or s[2] == '1' then
    return -1
end
redis.call('HSET', KEYS[1], 'attempts', ARGV[2], 'is_verified', ARGV[3], 'verified_at_us', ARGV[4])
return redis.call('HINCRBY', KEYS[1], 'version', 1)
"#;

/// Deletes a pair's sessions that expired before ARGV[2]; returns the count
const DELETE_EXPIRED_SCRIPT: &str = r#"
local removed = 0
for _, sid in ipairs(redis.call('SMEMBERS', KEYS[1])) do
    local key = ARGV[1] .. sid
    local expires_at_us = redis.call('HGET', key, 'expires_at_us')
    if not expires_at_us then
        redis.call('SREM', KEYS[1], sid)
        redis.call('ZREM', KEYS[2], sid)
    elseif tonumber(expires_at_us) < tonumber(ARGV[2]) then
        redis.call('DEL', key)
        redis.call('SREM', KEYS[1], sid)
        redis.call('ZREM', KEYS[2], sid)
        removed = removed + 1
    end
end
return removed
"#;

/// Deletes every session that expired before ARGV[3]; returns the count
const PURGE_EXPIRED_SCRIPT: &str = r#"
local removed = 0
for _, sid in ipairs(redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', '(' .. ARGV[3])) do
    local key = ARGV[1] .. sid
    local s = redis.call('HMGET', key, 'verification_type', 'identifier')
    if s[1] then
        redis.call('SREM', ARGV[2] .. s[1] .. ':' .. s[2], sid)
        redis.call('DEL', key)
        removed = removed + 1
    end
    redis.call('ZREM', KEYS[1], sid)
end
return removed
"#;

/// Redis implementation of OtpSessionRepository
///
/// Session hashes carry a TTL of their lifetime plus `retention`, so Redis
/// drops them even if no cleanup job runs.
pub struct RedisOtpSessionStore {
    client: RedisClient,
    retention: Duration,
    insert_script: Script,
    update_script: Script,
    delete_expired_script: Script,
    purge_expired_script: Script,
}

impl RedisOtpSessionStore {
    /// Create a store with a one-day retention after expiry
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            retention: Duration::days(1),
            insert_script: Script::new(INSERT_SCRIPT),
            update_script: Script::new(UPDATE_SCRIPT),
            delete_expired_script: Script::new(DELETE_EXPIRED_SCRIPT),
            purge_expired_script: Script::new(PURGE_EXPIRED_SCRIPT),
        }
    }

    /// How long a session hash outlives its `expires_at`
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    fn session_prefix(&self) -> String {
        session_prefix(self.client.key_prefix())
    }

    fn index_prefix(&self) -> String {
        index_prefix(self.client.key_prefix())
    }

    fn index_key(&self, identifier: &str, verification_type: VerificationType) -> String {
        format!("{}{}:{}", self.index_prefix(), verification_type.as_str(), identifier)
    }

    fn expiry_key(&self) -> String {
        format!("{}:otp:expiry", self.client.key_prefix())
    }

    fn sequence_key(&self) -> String {
        format!("{}:otp:seq", self.client.key_prefix())
    }
}

pub(crate) fn session_prefix(key_prefix: &str) -> String {
    format!("{}:otp:session:", key_prefix)
}

pub(crate) fn index_prefix(key_prefix: &str) -> String {
    format!("{}:otp:index:", key_prefix)
}

pub(crate) fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

pub(crate) fn from_micros(us: i64) -> StoreResult<DateTime<Utc>> {
    let secs = us.div_euclid(1_000_000);
    let nanos = (us.rem_euclid(1_000_000) * 1_000) as u32;

    Utc.timestamp_opt(secs, nanos)
        .single()
        .ok_or_else(|| StoreError::backend(format!("Invalid timestamp: {}", us)))
}

/// Hash fields written for a new session, `sequence` excluded
pub(crate) fn session_fields(session: &OtpSession) -> Vec<(&'static str, String)> {
    vec![
        ("id", session.id.to_string()),
        ("identifier", session.identifier.clone()),
        ("identifier_kind", session.identifier_kind.as_str().to_string()),
        ("verification_type", session.verification_type.as_str().to_string()),
        ("code", session.code.clone()),
        ("created_at_us", to_micros(session.created_at).to_string()),
        ("expires_at_us", to_micros(session.expires_at).to_string()),
        (
            "verified_at_us",
            session.verified_at.map(to_micros).map(|us| us.to_string()).unwrap_or_default(),
        ),
        ("is_verified", if session.is_verified { "1" } else { "0" }.to_string()),
        ("attempts", session.attempts.to_string()),
        ("max_attempts", session.max_attempts.to_string()),
        ("version", session.version.to_string()),
    ]
}

/// Rebuild a session from its hash; an empty hash means the key is gone
pub(crate) fn session_from_fields(
    fields: &HashMap<String, String>,
) -> StoreResult<Option<OtpSession>> {
    if fields.is_empty() {
        return Ok(None);
    }

    let field = |name: &str| -> StoreResult<&str> {
        fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| StoreError::backend(format!("Missing session field: {}", name)))
    };
    let number = |name: &str| -> StoreResult<i64> {
        field(name)?
            .parse::<i64>()
            .map_err(|e| StoreError::backend(format!("Invalid {}: {}", name, e)))
    };

    let verified_at = match field("verified_at_us")? {
        "" => None,
        us => Some(from_micros(us.parse().map_err(StoreError::backend)?)?),
    };

    Ok(Some(OtpSession {
        id: Uuid::parse_str(field("id")?).map_err(StoreError::backend)?,
        identifier: field("identifier")?.to_string(),
        identifier_kind: field("identifier_kind")?.parse().map_err(StoreError::backend)?,
        verification_type: field("verification_type")?.parse().map_err(StoreError::backend)?,
        code: field("code")?.to_string(),
        created_at: from_micros(number("created_at_us")?)?,
        expires_at: from_micros(number("expires_at_us")?)?,
        verified_at,
        is_verified: field("is_verified")? == "1",
        attempts: number("attempts")? as i32,
        max_attempts: number("max_attempts")? as i32,
        sequence: number("sequence")?,
        version: number("version")?,
    }))
}

#[async_trait]
impl OtpSessionRepository for RedisOtpSessionStore {
    async fn find(
        &self,
        identifier: &str,
        verification_type: VerificationType,
        filter: SessionFilter,
    ) -> StoreResult<Vec<OtpSession>> {
        let mut conn = self.client.connection();

        let ids: Vec<String> = conn
            .smembers(self.index_key(identifier, verification_type))
            .await
            .map_err(StoreError::backend)?;

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let session_prefix = self.session_prefix();
        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(format!("{}{}", session_prefix, id));
        }

        let records: Vec<HashMap<String, String>> = pipe
            .query_async(&mut conn)
            .await
            .map_err(StoreError::backend)?;

        let mut sessions = Vec::with_capacity(records.len());
        for record in &records {
            if let Some(session) = session_from_fields(record)? {
                if filter.matches(&session) {
                    sessions.push(session);
                }
            }
        }

        sessions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.sequence.cmp(&a.sequence))
        });

        Ok(sessions)
    }

    async fn insert(&self, mut session: OtpSession) -> StoreResult<OtpSession> {
        let mut conn = self.client.connection();

        let ttl_ms = ((session.expires_at - session.created_at) + self.retention)
            .num_milliseconds()
            .max(1);

        let mut invocation = self.insert_script.prepare_invoke();
        invocation
            .key(self.index_key(&session.identifier, session.verification_type))
            .key(self.sequence_key())
            .key(self.expiry_key())
            .arg(self.session_prefix())
            .arg(session.id.to_string())
            .arg(to_micros(session.created_at))
            .arg(ttl_ms)
            .arg(to_micros(session.expires_at));
        for (name, value) in session_fields(&session) {
            invocation.arg(name).arg(value);
        }

        let sequence: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(StoreError::backend)?;

        if sequence < 0 {
            return Err(StoreError::Duplicate);
        }

        session.sequence = sequence;

        debug!(
            session_id = %session.id,
            sequence = sequence,
            "Inserted OTP session"
        );

        Ok(session)
    }

    async fn update(&self, mut session: OtpSession) -> StoreResult<OtpSession> {
        let mut conn = self.client.connection();

        let verified_at_us = session
            .verified_at
            .map(to_micros)
            .map(|us| us.to_string())
            .unwrap_or_default();

        let version: i64 = self
            .update_script
            .key(format!("{}{}", self.session_prefix(), session.id))
            .arg(session.version)
            .arg(session.attempts)
            .arg(if session.is_verified { "1" } else { "0" })
            .arg(verified_at_us)
            .invoke_async(&mut conn)
            .await
            .map_err(StoreError::backend)?;

        match version {
            -2 => Err(StoreError::Missing { id: session.id }),
            -1 => Err(StoreError::Conflict),
            _ => {
                session.version = version;
                Ok(session)
            }
        }
    }

    async fn delete_expired(
        &self,
        identifier: &str,
        verification_type: VerificationType,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut conn = self.client.connection();

        let removed: u64 = self
            .delete_expired_script
            .key(self.index_key(identifier, verification_type))
            .key(self.expiry_key())
            .arg(self.session_prefix())
            .arg(to_micros(now))
            .invoke_async(&mut conn)
            .await
            .map_err(StoreError::backend)?;

        Ok(removed)
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let mut conn = self.client.connection();

        let removed: u64 = self
            .purge_expired_script
            .key(self.expiry_key())
            .arg(self.session_prefix())
            .arg(self.index_prefix())
            .arg(to_micros(before))
            .invoke_async(&mut conn)
            .await
            .map_err(StoreError::backend)?;

        Ok(removed)
    }
}
