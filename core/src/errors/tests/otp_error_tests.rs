//! Unit tests for OTP error mapping

use uuid::Uuid;

use crate::errors::{ErrorResponse, OtpError, StoreError};

#[test]
fn test_store_error_maps_to_service_error() {
    assert!(matches!(OtpError::from(StoreError::Duplicate), OtpError::Duplicate));
    assert!(matches!(OtpError::from(StoreError::Conflict), OtpError::Conflict));
    assert!(matches!(
        OtpError::from(StoreError::Missing { id: Uuid::new_v4() }),
        OtpError::Store(StoreError::Missing { .. })
    ));
    assert!(matches!(
        OtpError::from(StoreError::backend("connection reset")),
        OtpError::Store(StoreError::Backend { .. })
    ));
}

#[test]
fn test_error_codes_are_distinct() {
    let errors = [
        OtpError::InvalidIdentifier { reason: "empty".to_string() },
        OtpError::NotFound,
        OtpError::Expired,
        OtpError::AttemptsExhausted,
        OtpError::InvalidCode { remaining_attempts: 1 },
        OtpError::AlreadyVerified,
        OtpError::Duplicate,
        OtpError::Conflict,
        OtpError::Store(StoreError::backend("down")),
    ];

    let codes: std::collections::HashSet<_> = errors.iter().map(|e| e.error_code()).collect();
    assert_eq!(codes.len(), errors.len());
}

#[test]
fn test_transient_errors() {
    assert!(OtpError::Duplicate.is_transient());
    assert!(OtpError::Conflict.is_transient());
    assert!(!OtpError::Expired.is_transient());
    assert!(!OtpError::InvalidCode { remaining_attempts: 2 }.is_transient());
}

#[test]
fn test_invalid_code_message_and_response() {
    let err = OtpError::InvalidCode { remaining_attempts: 2 };
    assert_eq!(err.to_string(), "Invalid verification code. 2 attempt(s) remaining");

    let response = ErrorResponse::from(err);
    assert_eq!(response.error, "OTP_INVALID_CODE");
    let details = response.details.unwrap();
    assert_eq!(details["remaining_attempts"], serde_json::json!(2));
}

#[test]
fn test_store_error_response_hides_backend_details() {
    let response = ErrorResponse::from(OtpError::Store(StoreError::backend("mysql: password rejected")));

    assert_eq!(response.error, "OTP_STORE_ERROR");
    assert!(!response.message.contains("password"));
    assert!(response.details.is_none());
}

#[test]
fn test_error_response_serialization_skips_empty_details() {
    let response = ErrorResponse::from(OtpError::Expired);
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["error"], "OTP_EXPIRED");
    assert_eq!(json["message"], "Verification code expired");
    assert!(json.get("details").is_none());
}
