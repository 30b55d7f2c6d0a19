//! MySQL repository implementations

mod otp_session_repository_impl;

pub use otp_session_repository_impl::MySqlOtpSessionRepository;
