//! Main OTP verifier implementation

use chrono::Duration;
use std::sync::Arc;

use kl_shared::identifier::{is_valid_email, is_valid_phone, mask_identifier};

use crate::domain::entities::otp_session::{
    is_well_formed_code, AttemptOutcome, IdentifierKind, OtpSession, VerificationType,
};
use crate::errors::{OtpError, OtpResult, StoreError};
use crate::repositories::{OtpSessionRepository, SessionFilter};

use super::clock::{Clock, SystemClock};
use super::code_generator::{CodeGenerator, RandomCodeGenerator};
use super::config::OtpVerifierConfig;
use super::types::OtpSessionStatus;

/// Issues and checks one-time passcodes against an injected session store
///
/// The verifier holds no session state of its own. Every decision is made
/// against the store, whose `insert` and `update` carry the atomicity
/// guarantees, so one verifier can be shared freely across tasks.
pub struct OtpVerifier<R: ?Sized, C: ?Sized = SystemClock> {
    /// Session persistence
    repository: Arc<R>,
    /// Time source
    clock: Arc<C>,
    /// Passcode source
    code_generator: Arc<dyn CodeGenerator>,
    /// Verifier configuration
    config: OtpVerifierConfig,
}

impl<R: OtpSessionRepository + ?Sized> OtpVerifier<R> {
    /// Create a verifier on the wall clock
    ///
    /// # Arguments
    ///
    /// * `repository` - Session store implementation
    /// * `config` - Verifier configuration
    pub fn new(repository: Arc<R>, config: OtpVerifierConfig) -> Self {
        Self::with_clock(repository, Arc::new(SystemClock), config)
    }
}

impl<R, C> OtpVerifier<R, C>
where
    R: OtpSessionRepository + ?Sized,
    C: Clock + ?Sized,
{
    /// Create a verifier with an explicit time source
    pub fn with_clock(repository: Arc<R>, clock: Arc<C>, config: OtpVerifierConfig) -> Self {
        Self {
            repository,
            clock,
            code_generator: Arc::new(RandomCodeGenerator),
            config,
        }
    }

    /// Replace the passcode source
    pub fn with_code_generator(mut self, code_generator: Arc<dyn CodeGenerator>) -> Self {
        self.code_generator = code_generator;
        self
    }

    pub fn config(&self) -> &OtpVerifierConfig {
        &self.config
    }

    /// Return the usable session for the identifier, creating one if needed
    ///
    /// This method:
    /// 1. Validates the identifier as an email address or phone number
    /// 2. Deletes the pair's expired sessions
    /// 3. Returns the latest usable session unchanged if there is one
    /// 4. Otherwise generates a new code and inserts a new session
    ///
    /// Delivering the code is left to the caller. A reused session carries
    /// the code that was issued with it.
    ///
    /// # Returns
    ///
    /// * `Ok(OtpSession)` - The reused or newly created session
    /// * `Err(OtpError::Duplicate)` - A concurrent call created a session first
    /// * `Err(OtpError)` - If validation or the store fails
    pub async fn create_session(
        &self,
        identifier: &str,
        verification_type: VerificationType,
    ) -> OtpResult<OtpSession> {
        let masked = mask_identifier(identifier);

        if let Err(e) = validate_identifier(identifier) {
            tracing::warn!(
                identifier = %masked,
                verification_type = %verification_type,
                error = %e,
                event = "otp_identifier_rejected",
                "Rejected OTP session request"
            );
            return Err(e);
        }
        let now = self.clock.now();

        let purged = self
            .repository
            .delete_expired(identifier, verification_type, now)
            .await
            .map_err(|e| store_failure(&masked, "delete_expired", e))?;

        if purged > 0 {
            tracing::debug!(
                identifier = %masked,
                verification_type = %verification_type,
                purged = purged,
                "Removed expired OTP sessions"
            );
        }

        let existing = self
            .repository
            .find_latest(identifier, verification_type, SessionFilter::usable(now))
            .await
            .map_err(|e| store_failure(&masked, "find", e))?;

        if let Some(session) = existing.filter(|s| s.is_usable(now)) {
            tracing::info!(
                identifier = %masked,
                verification_type = %verification_type,
                session_id = %session.id,
                remaining_attempts = session.remaining_attempts(),
                event = "otp_session_reused",
                "Reusing active OTP session"
            );
            return Ok(session);
        }

        let session = OtpSession::new(
            identifier,
            verification_type,
            self.code_generator.generate(),
            now,
            Duration::minutes(self.config.expiration_minutes),
            self.config.max_attempts,
        );

        match self.repository.insert(session).await {
            Ok(session) => {
                tracing::info!(
                    identifier = %masked,
                    verification_type = %verification_type,
                    identifier_kind = session.identifier_kind.as_str(),
                    session_id = %session.id,
                    expires_at = %session.expires_at,
                    event = "otp_session_created",
                    "Created new OTP session"
                );
                Ok(session)
            }
            Err(StoreError::Duplicate) => {
                tracing::warn!(
                    identifier = %masked,
                    verification_type = %verification_type,
                    event = "otp_session_duplicate",
                    "Concurrent request created an OTP session first"
                );
                Err(OtpError::Duplicate)
            }
            Err(e) => Err(store_failure(&masked, "insert", e)),
        }
    }

    /// Check a candidate code against the latest unverified session
    ///
    /// The attempt is charged and the outcome recorded in a single
    /// compare-and-swap write. When a concurrent verify wins the race the
    /// session is re-read and the attempt replayed, up to
    /// `max_conflict_retries` times.
    ///
    /// # Returns
    ///
    /// * `Ok(OtpSession)` - The verified session
    /// * `Err(OtpError::NotFound)` - No unverified session exists
    /// * `Err(OtpError::Expired)` - The session expired; no attempt charged
    /// * `Err(OtpError::AttemptsExhausted)` - No attempts left; no attempt charged
    /// * `Err(OtpError::InvalidCode)` - Wrong code; one attempt charged
    /// * `Err(OtpError::Conflict)` - Lost every compare-and-swap race
    pub async fn verify(
        &self,
        identifier: &str,
        code: &str,
        verification_type: VerificationType,
    ) -> OtpResult<OtpSession> {
        let masked = mask_identifier(identifier);
        let mut conflicts = 0u32;

        loop {
            let now = self.clock.now();

            let mut session = self
                .repository
                .find_latest(identifier, verification_type, SessionFilter::unverified())
                .await
                .map_err(|e| store_failure(&masked, "find", e))?
                .ok_or(OtpError::NotFound)?;

            let outcome = match session.attempt(code, now) {
                Ok(outcome) => outcome,
                Err(OtpError::Expired) => {
                    tracing::info!(
                        identifier = %masked,
                        verification_type = %verification_type,
                        session_id = %session.id,
                        event = "otp_expired",
                        "OTP session expired"
                    );
                    return Err(OtpError::Expired);
                }
                Err(OtpError::AttemptsExhausted) => {
                    tracing::warn!(
                        identifier = %masked,
                        verification_type = %verification_type,
                        session_id = %session.id,
                        attempts = session.attempts,
                        event = "otp_attempts_exhausted",
                        "OTP session has no attempts left"
                    );
                    return Err(OtpError::AttemptsExhausted);
                }
                Err(e) => return Err(e),
            };

            match self.repository.update(session).await {
                Ok(updated) => {
                    return match outcome {
                        AttemptOutcome::Verified => {
                            tracing::info!(
                                identifier = %masked,
                                verification_type = %verification_type,
                                session_id = %updated.id,
                                attempts = updated.attempts,
                                event = "otp_verified",
                                "OTP verified successfully"
                            );
                            Ok(updated)
                        }
                        AttemptOutcome::Mismatch { .. } => {
                            let remaining_attempts = updated.remaining_attempts();
                            tracing::warn!(
                                identifier = %masked,
                                verification_type = %verification_type,
                                session_id = %updated.id,
                                attempts = updated.attempts,
                                remaining_attempts = remaining_attempts,
                                malformed = !is_well_formed_code(code),
                                event = "otp_verification_failed",
                                "OTP verification failed"
                            );
                            Err(OtpError::InvalidCode { remaining_attempts })
                        }
                    };
                }
                Err(StoreError::Conflict) if conflicts < self.config.max_conflict_retries => {
                    conflicts += 1;
                    tracing::debug!(
                        identifier = %masked,
                        verification_type = %verification_type,
                        retry = conflicts,
                        event = "otp_verify_conflict",
                        "Concurrent update on OTP session, retrying"
                    );
                }
                Err(StoreError::Conflict) => {
                    tracing::warn!(
                        identifier = %masked,
                        verification_type = %verification_type,
                        retries = conflicts,
                        event = "otp_verify_conflict",
                        "Giving up on OTP verification after repeated conflicts"
                    );
                    return Err(OtpError::Conflict);
                }
                Err(e) => return Err(store_failure(&masked, "update", e)),
            }
        }
    }

    /// Status of the latest session for the pair, verified or not
    pub async fn session_status(
        &self,
        identifier: &str,
        verification_type: VerificationType,
    ) -> OtpResult<Option<OtpSessionStatus>> {
        let now = self.clock.now();

        let latest = self
            .repository
            .find_latest(identifier, verification_type, SessionFilter::all())
            .await
            .map_err(|e| store_failure(&mask_identifier(identifier), "find", e))?;

        Ok(latest.map(|session| OtpSessionStatus::from_session(&session, now)))
    }
}

fn validate_identifier(identifier: &str) -> OtpResult<()> {
    if identifier.trim().is_empty() {
        return Err(OtpError::InvalidIdentifier {
            reason: "identifier must not be empty".to_string(),
        });
    }

    let (kind, valid) = match IdentifierKind::infer(identifier) {
        IdentifierKind::Email => ("email address", is_valid_email(identifier)),
        IdentifierKind::Phone => ("phone number", is_valid_phone(identifier)),
    };

    if valid {
        Ok(())
    } else {
        Err(OtpError::InvalidIdentifier {
            reason: format!("not a valid {}", kind),
        })
    }
}

fn store_failure(masked: &str, operation: &'static str, err: StoreError) -> OtpError {
    tracing::error!(
        identifier = %masked,
        operation = operation,
        error = %err,
        event = "otp_store_failed",
        "OTP session store operation failed"
    );
    err.into()
}
