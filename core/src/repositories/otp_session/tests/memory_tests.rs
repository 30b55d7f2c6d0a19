//! Unit tests for the in-memory session repository

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::domain::entities::otp_session::{OtpSession, VerificationType, MAX_ATTEMPTS};
use crate::errors::StoreError;
use crate::repositories::otp_session::{
    ExpiryFilter, InMemoryOtpSessionRepository, OtpSessionRepository, SessionFilter,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

fn session_at(identifier: &str, vt: VerificationType, code: &str, now: DateTime<Utc>) -> OtpSession {
    OtpSession::new(identifier, vt, code, now, Duration::minutes(30), MAX_ATTEMPTS)
}

#[tokio::test]
async fn test_insert_assigns_increasing_sequence() {
    let repo = InMemoryOtpSessionRepository::new();

    let first = repo
        .insert(session_at("a@x.com", VerificationType::Email, "111111", t0()))
        .await
        .unwrap();
    let second = repo
        .insert(session_at("b@x.com", VerificationType::Email, "222222", t0()))
        .await
        .unwrap();

    assert!(second.sequence > first.sequence);
    assert_eq!(repo.len().await, 2);
}

#[tokio::test]
async fn test_insert_rejects_second_usable_session() {
    let repo = InMemoryOtpSessionRepository::new();
    repo.insert(session_at("a@x.com", VerificationType::Email, "111111", t0()))
        .await
        .unwrap();

    let result = repo
        .insert(session_at("a@x.com", VerificationType::Email, "222222", t0()))
        .await;

    assert!(matches!(result, Err(StoreError::Duplicate)));
}

#[tokio::test]
async fn test_insert_allows_other_type_for_same_identifier() {
    let repo = InMemoryOtpSessionRepository::new();
    repo.insert(session_at("a@x.com", VerificationType::Email, "111111", t0()))
        .await
        .unwrap();

    let result = repo
        .insert(session_at("a@x.com", VerificationType::PasswordReset, "222222", t0()))
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_insert_allowed_once_previous_session_is_exhausted() {
    let repo = InMemoryOtpSessionRepository::new();
    let mut stored = repo
        .insert(session_at("555-1234", VerificationType::Phone, "111111", t0()))
        .await
        .unwrap();

    stored.attempts = MAX_ATTEMPTS;
    repo.update(stored).await.unwrap();

    let result = repo
        .insert(session_at("555-1234", VerificationType::Phone, "222222", t0()))
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_insert_allowed_once_previous_session_expired() {
    let repo = InMemoryOtpSessionRepository::new();
    repo.insert(session_at("a@x.com", VerificationType::Email, "111111", t0()))
        .await
        .unwrap();

    let later = t0() + Duration::minutes(31);
    let result = repo
        .insert(session_at("a@x.com", VerificationType::Email, "222222", later))
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_find_orders_newest_first_with_sequence_tiebreak() {
    let repo = InMemoryOtpSessionRepository::new();

    // Same created_at; the first is retired so the second can be inserted
    let mut first = repo
        .insert(session_at("a@x.com", VerificationType::Email, "111111", t0()))
        .await
        .unwrap();
    first.attempts = MAX_ATTEMPTS;
    repo.update(first.clone()).await.unwrap();

    let second = repo
        .insert(session_at("a@x.com", VerificationType::Email, "222222", t0()))
        .await
        .unwrap();

    let found = repo
        .find("a@x.com", VerificationType::Email, SessionFilter::all())
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].id, second.id);
    assert_eq!(found[1].id, first.id);

    let latest = repo
        .find_latest("a@x.com", VerificationType::Email, SessionFilter::unverified())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, second.id);
}

#[tokio::test]
async fn test_find_applies_filter() {
    let repo = InMemoryOtpSessionRepository::new();
    repo.insert(session_at("a@x.com", VerificationType::Email, "111111", t0()))
        .await
        .unwrap();

    let later = t0() + Duration::minutes(45);

    let usable = repo
        .find("a@x.com", VerificationType::Email, SessionFilter::usable(later))
        .await
        .unwrap();
    assert!(usable.is_empty());

    let expired = repo
        .find("a@x.com", VerificationType::Email, SessionFilter::expired(later))
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);

    let custom = SessionFilter {
        is_verified: Some(true),
        expiry: ExpiryFilter::Any,
        attempts_remaining: false,
    };
    let verified = repo
        .find("a@x.com", VerificationType::Email, custom)
        .await
        .unwrap();
    assert!(verified.is_empty());
}

#[tokio::test]
async fn test_update_is_compare_and_swap() {
    let repo = InMemoryOtpSessionRepository::new();
    let stored = repo
        .insert(session_at("a@x.com", VerificationType::Email, "111111", t0()))
        .await
        .unwrap();

    let mut first_writer = stored.clone();
    first_writer.attempts = 1;
    let updated = repo.update(first_writer).await.unwrap();
    assert_eq!(updated.version, stored.version + 1);

    // A second writer holding the stale version loses
    let mut stale_writer = stored.clone();
    stale_writer.attempts = 1;
    assert!(matches!(repo.update(stale_writer).await, Err(StoreError::Conflict)));
}

#[tokio::test]
async fn test_update_never_changes_code() {
    let repo = InMemoryOtpSessionRepository::new();
    let mut stored = repo
        .insert(session_at("a@x.com", VerificationType::Email, "111111", t0()))
        .await
        .unwrap();

    stored.code = "999999".to_string();
    stored.attempts = 1;
    let updated = repo.update(stored).await.unwrap();

    assert_eq!(updated.code, "111111");
    assert_eq!(updated.attempts, 1);
}

#[tokio::test]
async fn test_update_rejects_verified_session() {
    let repo = InMemoryOtpSessionRepository::new();
    let mut stored = repo
        .insert(session_at("a@x.com", VerificationType::Email, "111111", t0()))
        .await
        .unwrap();

    stored.attempts = 1;
    stored.is_verified = true;
    stored.verified_at = Some(t0());
    let verified = repo.update(stored).await.unwrap();

    let mut again = verified.clone();
    again.attempts = 2;
    assert!(matches!(repo.update(again).await, Err(StoreError::Conflict)));
}

#[tokio::test]
async fn test_update_missing_session() {
    let repo = InMemoryOtpSessionRepository::new();
    let never_stored = session_at("a@x.com", VerificationType::Email, "111111", t0());

    assert!(matches!(
        repo.update(never_stored).await,
        Err(StoreError::Missing { .. })
    ));
}

#[tokio::test]
async fn test_delete_expired_is_scoped_to_pair() {
    let repo = InMemoryOtpSessionRepository::new();
    repo.insert(session_at("a@x.com", VerificationType::Email, "111111", t0()))
        .await
        .unwrap();
    repo.insert(session_at("b@x.com", VerificationType::Email, "222222", t0()))
        .await
        .unwrap();

    let later = t0() + Duration::hours(1);
    let deleted = repo
        .delete_expired("a@x.com", VerificationType::Email, later)
        .await
        .unwrap();

    assert_eq!(deleted, 1);
    assert_eq!(repo.len().await, 1);
}

#[tokio::test]
async fn test_purge_expired() {
    let repo = InMemoryOtpSessionRepository::new();
    repo.insert(session_at("a@x.com", VerificationType::Email, "111111", t0()))
        .await
        .unwrap();
    repo.insert(session_at("b@x.com", VerificationType::Login, "222222", t0() + Duration::hours(2)))
        .await
        .unwrap();

    let purged = repo.purge_expired(t0() + Duration::hours(1)).await.unwrap();

    assert_eq!(purged, 1);
    assert_eq!(repo.len().await, 1);
    assert!(!repo.is_empty().await);
}
