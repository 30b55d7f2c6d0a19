//! Tracing subscriber initialisation

use thiserror::Error;
use tracing_subscriber::{filter::ParseError, fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Errors raised while installing the global subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(#[from] ParseError),

    #[error("Failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Install the global `tracing` subscriber described by `config`
///
/// `RUST_LOG` takes precedence over the configured level when set.
/// Calling this twice returns [`LoggingError::Install`].
pub fn init_tracing(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let builder = fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_file(config.source_location)
        .with_line_number(config.source_location);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };

    installed.map_err(|e| LoggingError::Install(e.to_string()))?;

    tracing::debug!(level = %config.level, format = ?config.format, "Tracing initialised");
    Ok(())
}
