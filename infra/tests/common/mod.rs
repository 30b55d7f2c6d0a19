//! Behaviour every session store must share, run against live backends

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use kl_core::domain::entities::{OtpSession, VerificationType, MAX_ATTEMPTS};
use kl_core::errors::{OtpError, StoreError};
use kl_core::repositories::{OtpSessionRepository, SessionFilter};
use kl_core::services::otp::{OtpVerifier, OtpVerifierConfig};

/// An identifier no earlier run has used
pub fn fresh_identifier() -> String {
    format!("it-{}@koluvu.test", Uuid::new_v4())
}

fn new_session(identifier: &str, code: &str) -> OtpSession {
    OtpSession::new(
        identifier,
        VerificationType::Email,
        code,
        Utc::now(),
        Duration::minutes(30),
        MAX_ATTEMPTS,
    )
}

pub async fn assert_insert_rejects_duplicate<R: OtpSessionRepository>(repo: &R) {
    let identifier = fresh_identifier();

    let first = repo.insert(new_session(&identifier, "111111")).await.unwrap();
    assert!(first.sequence > 0);

    let second = repo.insert(new_session(&identifier, "222222")).await;
    assert!(matches!(second, Err(StoreError::Duplicate)));

    let found = repo
        .find(&identifier, VerificationType::Email, SessionFilter::all())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].code, "111111");
}

pub async fn assert_round_trip_keeps_timestamps<R: OtpSessionRepository>(repo: &R) {
    let identifier = fresh_identifier();
    let now = Utc::now().date_naive().and_hms_nano_opt(9, 0, 0, 999_999).unwrap().and_utc();
    let session = OtpSession::new(
        &identifier,
        VerificationType::Email,
        "111111",
        now,
        Duration::minutes(30),
        MAX_ATTEMPTS,
    );

    let stored = repo.insert(session).await.unwrap();
    let found = repo
        .find_latest(&identifier, VerificationType::Email, SessionFilter::all())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found, stored);
    assert!(!found.is_expired(stored.expires_at));
    assert!(found.is_expired(stored.expires_at + Duration::microseconds(1)));
}

pub async fn assert_update_is_compare_and_swap<R: OtpSessionRepository>(repo: &R) {
    let identifier = fresh_identifier();
    let stored = repo.insert(new_session(&identifier, "111111")).await.unwrap();

    let mut winner = stored.clone();
    winner.attempts = 1;
    let updated = repo.update(winner).await.unwrap();
    assert_eq!(updated.attempts, 1);
    assert_eq!(updated.version, stored.version + 1);

    let reread = repo
        .find_latest(&identifier, VerificationType::Email, SessionFilter::all())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reread, updated);

    // The returned version is the stored one, so it can be updated again
    let mut next = updated.clone();
    next.attempts = 2;
    assert_eq!(repo.update(next).await.unwrap().version, stored.version + 2);

    let mut loser = stored.clone();
    loser.attempts = 1;
    assert!(matches!(repo.update(loser).await, Err(StoreError::Conflict)));

    let missing = new_session(&fresh_identifier(), "333333");
    assert!(matches!(
        repo.update(missing).await,
        Err(StoreError::Missing { .. })
    ));
}

pub async fn assert_expired_sessions_are_deleted<R: OtpSessionRepository>(repo: &R) {
    let identifier = fresh_identifier();
    let stored = repo.insert(new_session(&identifier, "111111")).await.unwrap();

    let later = stored.expires_at + Duration::minutes(1);
    let deleted = repo
        .delete_expired(&identifier, VerificationType::Email, later)
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let latest = repo
        .find_latest(&identifier, VerificationType::Email, SessionFilter::all())
        .await
        .unwrap();
    assert!(latest.is_none());
}

pub async fn assert_concurrent_wrong_codes_are_bounded<R>(repo: Arc<R>)
where
    R: OtpSessionRepository + 'static,
{
    let identifier = fresh_identifier();
    let verifier = Arc::new(OtpVerifier::new(repo.clone(), OtpVerifierConfig::default()));

    let session = verifier
        .create_session(&identifier, VerificationType::Email)
        .await
        .unwrap();
    let wrong = if session.code == "000000" { "111111" } else { "000000" };

    let mut handles = Vec::new();
    for _ in 0..8 {
        let verifier = verifier.clone();
        let identifier = identifier.clone();
        handles.push(tokio::spawn(async move {
            verifier
                .verify(&identifier, wrong, VerificationType::Email)
                .await
        }));
    }

    for handle in handles {
        match handle.await.unwrap() {
            Err(OtpError::InvalidCode { .. }) | Err(OtpError::AttemptsExhausted) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    let stored = repo
        .find_latest(&identifier, VerificationType::Email, SessionFilter::all())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.attempts, MAX_ATTEMPTS);
}
