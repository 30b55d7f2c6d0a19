//! Periodic purge of expired OTP sessions
//!
//! Sessions are left in the store after they expire so that `verify` can
//! report `Expired` rather than `NotFound`. This service removes them once
//! they are past a grace period.

use chrono::Duration;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use kl_shared::config::CleanupConfig;

use crate::errors::StoreError;
use crate::repositories::OtpSessionRepository;

use super::clock::{Clock, SystemClock};

/// Service for deleting expired sessions in the background
pub struct OtpCleanupService<R: ?Sized, C: ?Sized = SystemClock> {
    repository: Arc<R>,
    clock: Arc<C>,
    config: CleanupConfig,
}

impl<R: OtpSessionRepository + ?Sized> OtpCleanupService<R> {
    /// Create a new cleanup service on the wall clock
    pub fn new(repository: Arc<R>, config: CleanupConfig) -> Self {
        Self::with_clock(repository, Arc::new(SystemClock), config)
    }
}

impl<R, C> OtpCleanupService<R, C>
where
    R: OtpSessionRepository + ?Sized,
    C: Clock + ?Sized,
{
    pub fn with_clock(repository: Arc<R>, clock: Arc<C>, config: CleanupConfig) -> Self {
        Self {
            repository,
            clock,
            config,
        }
    }

    /// Run a single cleanup cycle
    ///
    /// Deletes every session whose `expires_at` is older than the grace
    /// period. A disabled service does nothing.
    ///
    /// # Returns
    /// * `Ok(CleanupResult)` - Summary of the cycle
    /// * `Err(StoreError)` - If the store fails
    pub async fn run_cleanup(&self) -> Result<CleanupResult, StoreError> {
        if !self.config.enabled {
            return Ok(CleanupResult::default());
        }

        let cutoff = self.clock.now() - Duration::minutes(self.config.grace_period_minutes);
        let expired_sessions_deleted = self.repository.purge_expired(cutoff).await?;

        info!(
            deleted = expired_sessions_deleted,
            cutoff = %cutoff,
            event = "otp_cleanup_completed",
            "OTP session cleanup completed"
        );

        Ok(CleanupResult {
            expired_sessions_deleted,
        })
    }

    pub fn config(&self) -> &CleanupConfig {
        &self.config
    }
}

impl<R, C> OtpCleanupService<R, C>
where
    R: OtpSessionRepository + ?Sized + 'static,
    C: Clock + ?Sized + 'static,
{
    /// Start the cleanup service as a background task
    ///
    /// Spawns a tokio task that runs cleanup at regular intervals. Returns
    /// `None` when the service is disabled.
    pub fn start_background_task(self: Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            warn!("OTP cleanup service is disabled");
            return None;
        }

        let interval = std::time::Duration::from_secs(self.config.interval_seconds.max(1));

        Some(tokio::spawn(async move {
            info!(
                interval_seconds = self.config.interval_seconds,
                "OTP cleanup service started"
            );

            let mut interval_timer = tokio::time::interval(interval);

            loop {
                interval_timer.tick().await;

                if let Err(e) = self.run_cleanup().await {
                    error!(error = %e, "OTP cleanup cycle failed");
                }
            }
        }))
    }
}

/// Result of a cleanup operation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupResult {
    /// Number of expired sessions deleted
    pub expired_sessions_deleted: u64,
}
