//! Configuration module with business-specific sub-modules
//!
//! This module organizes configuration into logical areas:
//! - `cache` - Redis connection configuration
//! - `database` - Database connection and pool configuration
//! - `environment` - Environment detection and logging configuration
//! - `otp` - OTP session lifecycle and storage configuration

pub mod cache;
pub mod database;
pub mod environment;
pub mod otp;

use std::path::Path;

use config::{Config, File};
use serde::{Deserialize, Serialize};

pub use cache::CacheConfig;
pub use config::ConfigError;
pub use database::DatabaseConfig;
pub use environment::{Environment, LogFormat, LoggingConfig, ENVIRONMENT_VAR, OTP_EVENT_TARGET};
pub use otp::{CleanupConfig, OtpConfig, StoreBackend};

/// Prefix for environment variable overrides, e.g. `KOLUVU__OTP__MAX_ATTEMPTS=5`
pub const ENV_PREFIX: &str = "KOLUVU";

/// Complete application configuration combining all sub-configurations
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Environment configuration
    pub environment: Environment,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration
    pub cache: CacheConfig,

    /// OTP lifecycle configuration
    pub otp: OtpConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::for_environment(Environment::default())
    }
}

impl AppConfig {
    /// Baseline configuration for an environment, before file and env overrides
    pub fn for_environment(environment: Environment) -> Self {
        let database = match environment {
            Environment::Production => DatabaseConfig::new("mysql://prod-db:3306/koluvu")
                .with_max_connections(50),
            _ => DatabaseConfig::default(),
        };

        Self {
            environment,
            database,
            cache: CacheConfig::default(),
            otp: OtpConfig::default(),
            logging: LoggingConfig::for_environment(environment),
        }
    }

    /// Load configuration for the current environment
    ///
    /// Sources are layered in increasing priority:
    /// 1. Environment baseline ([`AppConfig::for_environment`])
    /// 2. Optional `config.<environment>.toml` in the working directory
    /// 3. `KOLUVU__*` environment variables (`__` separates nesting levels)
    ///
    /// A `.env` file is loaded first if present.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let environment = Environment::from_env();
        Self::load_from(environment, Path::new(&environment.config_file()))
    }

    /// Load configuration using an explicit environment and config file path
    pub fn load_from(environment: Environment, file: &Path) -> Result<Self, ConfigError> {
        let baseline = Config::try_from(&Self::for_environment(environment))?;

        let mut loaded: AppConfig = Config::builder()
            .add_source(baseline)
            .add_source(File::from(file).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.environment = environment;
        Ok(loaded)
    }
}
