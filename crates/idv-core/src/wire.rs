//! Request and response bodies of the backend oracle

use serde::{Deserialize, Serialize};

use crate::types::{SessionToken, UserClaims, VerificationResult};

/// Body of `createVerificationSession`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    /// Where the provider should send the user back to (the Bridge)
    pub return_endpoint: String,
}

/// A freshly minted session, as returned by the oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionGrant {
    pub session_token: SessionToken,
    pub encrypted_request: String,
    pub integrity_tag: String,
}

/// Body of `verifyResult`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub session_token: SessionToken,
    pub encrypted_payload: String,
    pub integrity_tag: String,
}

impl From<&VerificationResult> for VerifyRequest {
    fn from(result: &VerificationResult) -> Self {
        Self {
            session_token: result.session_token.clone(),
            encrypted_payload: result.encrypted_payload.clone(),
            integrity_tag: result.integrity_tag.clone(),
        }
    }
}

/// Verdict of the oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub verified: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<UserClaims>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VerifyResponse {
    pub fn accepted(claims: UserClaims) -> Self {
        Self {
            verified: true,
            claims: Some(claims),
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            verified: false,
            claims: None,
            reason: Some(reason.into()),
        }
    }
}
