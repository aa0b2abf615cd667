//! Validation of submitted verification results
//!
//! A submission is accepted only when all of the following hold: the session
//! was minted here and not yet used, it has not expired, the integrity tag
//! matches the payload, and the payload was sealed for this session.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use idv_core::{UserClaims, VerifyRequest};

use crate::keys::{open_payload, IntegrityKey};
use crate::storage::SessionRecord;

/// Why a submission was refused
///
/// These are verdicts, not transport failures: the oracle answers them with
/// `verified: false` and the reason string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("unknown or already used session")]
    UnknownSession,

    #[error("session expired")]
    Expired,

    #[error("integrity check failed")]
    IntegrityMismatch,

    #[error("malformed payload")]
    MalformedPayload,

    #[error("payload sealed for another session")]
    SessionMismatch,
}

/// Validate a submission against the (already consumed) session record
///
/// `record` is whatever the store handed back for the submitted token; the
/// caller has removed it, so a rejected session can never be retried.
pub fn validate_submission(
    record: Option<&SessionRecord>,
    request: &VerifyRequest,
    key: &IntegrityKey,
    now: DateTime<Utc>,
    ttl: chrono::Duration,
) -> Result<UserClaims, Rejection> {
    let record = record.ok_or(Rejection::UnknownSession)?;

    if record.is_expired(now, ttl) {
        return Err(Rejection::Expired);
    }

    if !key.verify(&request.encrypted_payload, &request.integrity_tag) {
        warn!(
            session_token = %request.session_token,
            "Integrity tag does not match payload"
        );
        return Err(Rejection::IntegrityMismatch);
    }

    let payload = open_payload(&request.encrypted_payload).ok_or(Rejection::MalformedPayload)?;

    if payload.session_token != record.session_token {
        warn!(
            session_token = %record.session_token,
            sealed_for = %payload.session_token,
            "Payload replayed across sessions"
        );
        return Err(Rejection::SessionMismatch);
    }

    Ok(payload.claims)
}
