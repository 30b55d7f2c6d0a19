//! Unit tests for the OTP cleanup service

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use kl_shared::config::{CleanupConfig, OtpConfig};

use crate::domain::entities::otp_session::{OtpSession, VerificationType, MAX_ATTEMPTS};
use crate::repositories::{InMemoryOtpSessionRepository, OtpSessionRepository};
use crate::services::otp::{CleanupResult, ManualClock, OtpCleanupService};

use super::mocks::FailingRepository;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

async fn seeded_repository() -> Arc<InMemoryOtpSessionRepository> {
    let repository = Arc::new(InMemoryOtpSessionRepository::new());

    // Expires at t0 + 30m
    repository
        .insert(OtpSession::new(
            "old@x.com",
            VerificationType::Email,
            "111111",
            t0(),
            Duration::minutes(30),
            MAX_ATTEMPTS,
        ))
        .await
        .unwrap();

    // Expires at t0 + 150m
    repository
        .insert(OtpSession::new(
            "new@x.com",
            VerificationType::Email,
            "222222",
            t0() + Duration::hours(2),
            Duration::minutes(30),
            MAX_ATTEMPTS,
        ))
        .await
        .unwrap();

    repository
}

#[tokio::test]
async fn test_cleanup_respects_grace_period() {
    let repository = seeded_repository().await;
    let clock = Arc::new(ManualClock::new(t0() + Duration::minutes(60)));
    let service = OtpCleanupService::with_clock(
        repository.clone(),
        clock.clone(),
        CleanupConfig::default(),
    );

    // Expired 30 minutes ago, still inside the 60 minute grace period
    let result = service.run_cleanup().await.unwrap();
    assert_eq!(result, CleanupResult::default());
    assert_eq!(repository.len().await, 2);

    clock.advance(Duration::minutes(31));
    let result = service.run_cleanup().await.unwrap();
    assert_eq!(result.expired_sessions_deleted, 1);
    assert_eq!(repository.len().await, 1);
}

#[tokio::test]
async fn test_disabled_cleanup_does_nothing() {
    let repository = seeded_repository().await;
    let clock = Arc::new(ManualClock::new(t0() + Duration::days(1)));
    let config = CleanupConfig {
        enabled: false,
        ..CleanupConfig::default()
    };
    let service = Arc::new(OtpCleanupService::with_clock(repository.clone(), clock, config));

    let result = service.run_cleanup().await.unwrap();
    assert_eq!(result.expired_sessions_deleted, 0);
    assert_eq!(repository.len().await, 2);

    assert!(service.start_background_task().is_none());
}

#[tokio::test]
async fn test_cleanup_propagates_store_errors() {
    let service = OtpCleanupService::new(Arc::new(FailingRepository), CleanupConfig::default());

    assert!(service.run_cleanup().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_background_task_runs_cleanup() {
    let repository = seeded_repository().await;
    let clock = Arc::new(ManualClock::new(t0() + Duration::days(1)));
    let config = CleanupConfig {
        interval_seconds: 60,
        ..CleanupConfig::default()
    };
    let service = Arc::new(OtpCleanupService::with_clock(repository.clone(), clock, config));

    let handle = service.start_background_task().unwrap();

    // The first tick fires immediately
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    assert!(repository.is_empty().await);

    handle.abort();
}

fn wall_clock_service<R: OtpSessionRepository + ?Sized>(
    repository: Arc<R>,
    config: CleanupConfig,
) -> OtpCleanupService<R> {
    OtpCleanupService::new(repository, config)
}

#[tokio::test]
async fn test_wall_clock_service_for_unsized_repository() {
    let repository: Arc<dyn OtpSessionRepository> = seeded_repository().await;
    let service = wall_clock_service(repository.clone(), CleanupConfig::default());

    // Both seeded sessions expired long before the wall clock's now
    let result = service.run_cleanup().await.unwrap();
    assert_eq!(result.expired_sessions_deleted, 2);
}

#[test]
fn test_cleanup_uses_shared_config() {
    let mut otp = OtpConfig::default();
    otp.cleanup.interval_seconds = 120;
    otp.cleanup.grace_period_minutes = 5;

    let service = OtpCleanupService::new(
        Arc::new(InMemoryOtpSessionRepository::new()),
        otp.cleanup.clone(),
    );

    assert_eq!(service.config().interval_seconds, 120);
    assert_eq!(service.config().grace_period_minutes, 5);
    assert!(service.config().enabled);
}
