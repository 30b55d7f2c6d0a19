//! Error response body handed to the calling layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::OtpError;

/// Unified error response structure for API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details if available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,
    /// Timestamp when the error occurred
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(error: impl ToString, message: impl ToString) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    /// Add a single detail to the error response
    pub fn with_detail(mut self, key: impl ToString, value: serde_json::Value) -> Self {
        let mut details = self.details.unwrap_or_default();
        details.insert(key.to_string(), value);
        self.details = Some(details);
        self
    }
}

impl From<OtpError> for ErrorResponse {
    fn from(err: OtpError) -> Self {
        let response = ErrorResponse::new(err.error_code(), &err);

        match err {
            OtpError::InvalidCode { remaining_attempts } => {
                response.with_detail("remaining_attempts", remaining_attempts.into())
            }
            // Backend details stay in the logs
            OtpError::Store(_) => ErrorResponse::new(
                "OTP_STORE_ERROR",
                "Verification service is temporarily unavailable",
            ),
            _ => response,
        }
    }
}
