//! # Infrastructure Layer
//!
//! This crate provides the concrete OTP session stores for Koluvu and wires
//! them into the verifier and cleanup services.
//!
//! ## Architecture
//!
//! The infrastructure layer contains:
//! - **Database**: MySQL session store using SQLx, with embedded migrations
//! - **Cache**: Redis session store using Lua scripts for atomic writes
//! - **Wiring**: [`initialize`] builds the configured store and services
//!
//! ## Features
//!
//! - `mysql`: Enable the MySQL session store (default)
//! - `redis-cache`: Enable the Redis session store (default)

use std::sync::Arc;

use kl_core::repositories::{InMemoryOtpSessionRepository, OtpSessionRepository};
use kl_core::services::otp::{OtpCleanupService, OtpVerifier, OtpVerifierConfig};
use kl_shared::config::{AppConfig, StoreBackend};

/// Database module - MySQL implementations using SQLx
#[cfg(feature = "mysql")]
pub mod database;

/// Cache module - Redis client and session store
#[cfg(feature = "redis-cache")]
pub mod cache;

/// Session store selected by configuration
pub type SharedOtpRepository = Arc<dyn OtpSessionRepository>;

/// Infrastructure service container
#[derive(Clone)]
pub struct InfrastructureServices {
    /// The configured session store
    pub repository: SharedOtpRepository,
    /// Verifier bound to the store
    pub verifier: Arc<OtpVerifier<dyn OtpSessionRepository>>,
    /// Expired-session purge bound to the store
    pub cleanup: Arc<OtpCleanupService<dyn OtpSessionRepository>>,
}

impl InfrastructureServices {
    /// Wrap a store in the verifier and cleanup services
    pub fn new(repository: SharedOtpRepository, config: &AppConfig) -> Self {
        let verifier = OtpVerifier::new(
            repository.clone(),
            OtpVerifierConfig::from(&config.otp),
        );
        let cleanup = OtpCleanupService::new(repository.clone(), config.otp.cleanup.clone());

        Self {
            repository,
            verifier: Arc::new(verifier),
            cleanup: Arc::new(cleanup),
        }
    }

    /// Start the periodic purge of expired sessions
    pub fn start_cleanup(&self) -> Option<tokio::task::JoinHandle<()>> {
        self.cleanup.clone().start_background_task()
    }
}

/// Initialize infrastructure services from a loaded configuration
///
/// This function sets up:
/// - The session store selected by `otp.store`
/// - Database migrations when the MySQL store is used and enabled
/// - The verifier and cleanup services on top of the store
pub async fn initialize(config: &AppConfig) -> Result<InfrastructureServices, InfrastructureError> {
    tracing::info!(
        environment = %config.environment,
        store = ?config.otp.store,
        "Initializing infrastructure services..."
    );

    let repository = build_otp_repository(config).await?;
    let services = InfrastructureServices::new(repository, config);

    tracing::info!("Infrastructure services initialized successfully");

    Ok(services)
}

/// Load configuration from the environment, then [`initialize`]
pub async fn initialize_from_env() -> Result<InfrastructureServices, InfrastructureError> {
    let config = AppConfig::load().map_err(|e| InfrastructureError::Config(e.to_string()))?;
    initialize(&config).await
}

/// Build the session store selected by configuration
pub async fn build_otp_repository(
    config: &AppConfig,
) -> Result<SharedOtpRepository, InfrastructureError> {
    match config.otp.store {
        StoreBackend::Memory => {
            if config.environment.is_production() {
                tracing::warn!("Using the in-memory OTP store in production");
            }
            Ok(Arc::new(InMemoryOtpSessionRepository::new()))
        }
        StoreBackend::Mysql => build_mysql_repository(config).await,
        StoreBackend::Redis => build_redis_repository(config).await,
    }
}

#[cfg(feature = "mysql")]
async fn build_mysql_repository(
    config: &AppConfig,
) -> Result<SharedOtpRepository, InfrastructureError> {
    let pool = database::DatabasePool::new(config.database.clone()).await?;

    if config.database.run_migrations {
        pool.run_migrations().await?;
    }

    Ok(Arc::new(database::MySqlOtpSessionRepository::new(
        pool.get_pool().clone(),
    )))
}

#[cfg(not(feature = "mysql"))]
async fn build_mysql_repository(
    _config: &AppConfig,
) -> Result<SharedOtpRepository, InfrastructureError> {
    Err(InfrastructureError::Config(
        "MySQL store selected but the `mysql` feature is disabled".to_string(),
    ))
}

#[cfg(feature = "redis-cache")]
async fn build_redis_repository(
    config: &AppConfig,
) -> Result<SharedOtpRepository, InfrastructureError> {
    let client = cache::RedisClient::new(config.cache.clone()).await?;
    let retention = chrono::Duration::minutes(config.otp.cleanup.grace_period_minutes);

    Ok(Arc::new(
        cache::RedisOtpSessionStore::new(client).with_retention(retention),
    ))
}

#[cfg(not(feature = "redis-cache"))]
async fn build_redis_repository(
    _config: &AppConfig,
) -> Result<SharedOtpRepository, InfrastructureError> {
    Err(InfrastructureError::Config(
        "Redis store selected but the `redis-cache` feature is disabled".to_string(),
    ))
}

/// Infrastructure-specific error types
#[derive(Debug, thiserror::Error)]
pub enum InfrastructureError {
    /// Database connection error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Redis cache error
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
