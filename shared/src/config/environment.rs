//! Deployment environment and the logging defaults tied to it

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Variable naming the environment, e.g. `KOLUVU_ENV=production`
pub const ENVIRONMENT_VAR: &str = "KOLUVU_ENV";

/// Tracing target of the OTP lifecycle events (`otp_session_created`, `otp_verified`, ...)
pub const OTP_EVENT_TARGET: &str = "kl_core::services::otp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Read [`ENVIRONMENT_VAR`]; unset or unknown values mean development
    pub fn from_env() -> Self {
        std::env::var(ENVIRONMENT_VAR)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    /// Optional per-environment overrides, e.g. `config.staging.toml`
    pub fn config_file(&self) -> String {
        format!("config.{}.toml", self.as_str())
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

/// Tracing subscriber settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` overrides it
    pub level: String,

    pub format: LogFormat,

    /// ANSI colours, for terminals only
    pub ansi: bool,

    /// Include file and line of each event
    pub source_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Development)
    }
}

impl LoggingConfig {
    /// Defaults per environment
    ///
    /// Production stays at `warn` except for the OTP lifecycle events, which
    /// are kept at `info` so every issued and verified session is recorded.
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Development => Self {
                level: String::from("debug,sqlx=info"),
                format: LogFormat::Pretty,
                ansi: true,
                source_location: true,
            },
            Environment::Staging => Self {
                level: format!("info,{}=debug", OTP_EVENT_TARGET),
                format: LogFormat::Json,
                ansi: false,
                source_location: false,
            },
            Environment::Production => Self {
                level: format!("warn,{}=info", OTP_EVENT_TARGET),
                format: LogFormat::Json,
                ansi: false,
                source_location: false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}
