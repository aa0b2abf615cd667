//! Core types for the identity-verification handshake

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::HandshakeError;

/// Milliseconds since the Unix epoch, as carried in `createdAt`
pub type EpochMillis = i64;

/// Opaque session token minted by the backend oracle
///
/// The provider echoes it back as `token_version_id`, which is how a
/// delivered result is attributed to the attempt that started it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty token is what the Bridge emits when the redirect carried none
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for SessionToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// A signed verification session for one handshake attempt
///
/// Created by the Initiator from the oracle's grant and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationSession {
    /// Opaque session token
    pub session_token: SessionToken,
    /// Opaque blob the provider requires
    pub encrypted_request: String,
    /// Integrity tag over `encrypted_request`
    pub integrity_tag: String,
    /// Address of the Bridge page the provider redirects to
    pub return_endpoint: String,
    /// When this attempt obtained the session; results older than this are stale
    pub issued_at: DateTime<Utc>,
}

/// Which channel carried a message to the opener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPath {
    /// Shared store, written by whichever Bridge ran last
    Store,
    /// Cross-context channel opened for one attempt
    Channel,
}

/// How a delivered message relates to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    /// The message belongs to this session
    Accepted,
    /// The message carries another session's token
    Mismatched,
    /// The message was created before this session started
    Stale,
}

impl VerificationSession {
    /// Decide whether a delivered message belongs to this session
    ///
    /// ERROR messages with an empty token come from redirects that lost the
    /// token entirely. Only the channel can place them: it is opened per
    /// attempt, while the store outlives attempts, so a tokenless ERROR read
    /// from the store is treated as another session's.
    pub fn attribute(&self, message: &ResultMessage, path: DeliveryPath) -> Attribution {
        let token = message.session_token();
        let token_matches = match message {
            ResultMessage::Result(_) => *token == self.session_token,
            ResultMessage::Error(_) if token.is_empty() => path == DeliveryPath::Channel,
            ResultMessage::Error(_) => *token == self.session_token,
        };

        if !token_matches {
            Attribution::Mismatched
        } else if message.created_at() < self.issued_at.timestamp_millis() {
            Attribution::Stale
        } else {
            Attribution::Accepted
        }
    }

    /// Whether the session has outlived the given time-to-live
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.issued_at >= ttl
    }
}

/// Successful provider redirect, as published by the Bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub session_token: SessionToken,
    pub encrypted_payload: String,
    pub integrity_tag: String,
    pub created_at: EpochMillis,
}

/// Incomplete provider redirect, as published by the Bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResult {
    pub session_token: SessionToken,
    pub reason: String,
    pub created_at: EpochMillis,
}

/// Message carried by both delivery channels
///
/// Serialized as a flat object discriminated by `type`:
///
/// ```json
/// { "type": "RESULT", "sessionToken": "...", "encryptedPayload": "...",
///   "integrityTag": "...", "createdAt": 1700000000000 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ResultMessage {
    Result(VerificationResult),
    Error(ErrorResult),
}

impl ResultMessage {
    pub fn session_token(&self) -> &SessionToken {
        match self {
            ResultMessage::Result(r) => &r.session_token,
            ResultMessage::Error(e) => &e.session_token,
        }
    }

    pub fn created_at(&self) -> EpochMillis {
        match self {
            ResultMessage::Result(r) => r.created_at,
            ResultMessage::Error(e) => e.created_at,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ResultMessage::Error(_))
    }
}

impl fmt::Display for ResultMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultMessage::Result(r) => write!(f, "RESULT({})", r.session_token),
            ResultMessage::Error(e) => write!(f, "ERROR({}: {})", e.session_token, e.reason),
        }
    }
}

/// Identity attributes the oracle returns for a verified user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,

    /// Nationality flag: `true` for a foreign national
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreigner: Option<bool>,

    /// Any other attribute the oracle chose to return
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl UserClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_phone_number(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }

    pub fn with_birth_date(mut self, birth_date: impl Into<String>) -> Self {
        self.birth_date = Some(birth_date.into());
        self
    }

    pub fn with_foreigner(mut self, foreigner: bool) -> Self {
        self.foreigner = Some(foreigner);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Why a handshake ended in rejection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The provider redirect was incomplete
    Incomplete(String),
    /// The oracle rejected the payload
    Verification(String),
    /// The backend could not mint a session
    Provider(String),
    /// The oracle was unreachable
    Transient,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Incomplete(reason) => write!(f, "incomplete redirect: {}", reason),
            RejectReason::Verification(reason) => write!(f, "{}", reason),
            RejectReason::Provider(reason) => write!(f, "provider unavailable: {}", reason),
            RejectReason::Transient => f.write_str("transient"),
        }
    }
}

/// Terminal state of one handshake
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeOutcome {
    Verified(UserClaims),
    Rejected(RejectReason),
    Aborted,
    TimedOut,
}

/// Presentation of an outcome for the page that hosts the flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedOutcome {
    pub headline: String,
    pub detail: String,
    /// Every non-verified outcome offers a fresh `begin()`
    pub retry_available: bool,
}

impl HandshakeOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, HandshakeOutcome::Verified(_))
    }

    pub fn claims(&self) -> Option<&UserClaims> {
        match self {
            HandshakeOutcome::Verified(claims) => Some(claims),
            _ => None,
        }
    }

    pub fn render(&self) -> RenderedOutcome {
        let (headline, detail) = match self {
            HandshakeOutcome::Verified(claims) => (
                "Identity verified".to_string(),
                claims
                    .name
                    .as_ref()
                    .map(|name| format!("Verified as {}", name))
                    .unwrap_or_else(|| "Verification complete".to_string()),
            ),
            HandshakeOutcome::Rejected(RejectReason::Transient) => (
                "Verification service unavailable".to_string(),
                "Please try again in a moment".to_string(),
            ),
            HandshakeOutcome::Rejected(reason) => {
                ("Verification failed".to_string(), reason.to_string())
            }
            HandshakeOutcome::Aborted => (
                "Verification cancelled".to_string(),
                "No identity information was submitted".to_string(),
            ),
            HandshakeOutcome::TimedOut => (
                "Verification timed out".to_string(),
                "No response was received from the verification window".to_string(),
            ),
        };

        RenderedOutcome {
            headline,
            detail,
            retry_available: !self.is_verified(),
        }
    }
}

impl From<HandshakeError> for HandshakeOutcome {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::Provider(msg) | HandshakeError::ContextOpen(msg) => {
                HandshakeOutcome::Rejected(RejectReason::Provider(msg))
            }
            HandshakeError::Parse(msg) => HandshakeOutcome::Rejected(RejectReason::Incomplete(msg)),
            HandshakeError::VerificationRejected(msg) => {
                HandshakeOutcome::Rejected(RejectReason::Verification(msg))
            }
            HandshakeError::TransientNetwork(_) => HandshakeOutcome::Rejected(RejectReason::Transient),
            HandshakeError::TimedOut => HandshakeOutcome::TimedOut,
            HandshakeError::Cancelled => HandshakeOutcome::Aborted,
            HandshakeError::AlreadyInProgress | HandshakeError::Store(_) => {
                HandshakeOutcome::Rejected(RejectReason::Transient)
            }
        }
    }
}
