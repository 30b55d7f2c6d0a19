//! Shared utilities and common types for the Koluvu server
//!
//! This crate provides common functionality used across all server modules:
//! - Configuration types and loading
//! - Tracing subscriber initialisation
//! - Identifier utilities (email/phone shape detection, masking)

pub mod config;
pub mod logging;
pub mod utils;

// Re-export commonly used items at crate root
pub use config::{
    AppConfig, CacheConfig, CleanupConfig, ConfigError, DatabaseConfig, Environment, LogFormat,
    LoggingConfig, OtpConfig, StoreBackend,
};
pub use utils::identifier;
