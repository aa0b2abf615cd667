//! Session Handlers
//!
//! Mint verification sessions and judge the results that come back for them.

use axum::{extract::State, Json};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use idv_core::{CreateSessionRequest, SessionGrant, SessionToken, VerifyRequest, VerifyResponse};

use crate::api::error::ApiError;
use crate::core::{validate_submission, Rejection};
use crate::keys::IntegrityKey;
use crate::storage::{SessionRecord, SessionStore, Settlement};

/// Default lifetime of a minted session
pub const DEFAULT_SESSION_TTL_SECS: i64 = 600;

/// Oracle configuration
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// How long a minted session can be verified against
    pub session_ttl: chrono::Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            session_ttl: chrono::Duration::seconds(DEFAULT_SESSION_TTL_SECS),
        }
    }
}

/// Application state shared across handlers
pub struct AppState {
    /// Key shared with the provider
    pub key: IntegrityKey,
    /// Minted, not yet verified sessions
    pub store: Arc<dyn SessionStore>,
    pub config: OracleConfig,
}

/// What the oracle encodes into `encrypted_request` for the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDescriptor {
    pub session_token: SessionToken,
    pub return_endpoint: String,
    pub issued_at: DateTime<Utc>,
    pub nonce: String,
}

/// Mint a verification session
///
/// POST /v1/sessions
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<SessionGrant>, ApiError> {
    let return_endpoint = Url::parse(&request.return_endpoint)
        .map_err(|e| ApiError::BadRequest(format!("Invalid return endpoint: {}", e)))?;

    let session_token = SessionToken::new(uuid::Uuid::new_v4().simple().to_string());
    let issued_at = Utc::now();

    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);

    let descriptor = RequestDescriptor {
        session_token: session_token.clone(),
        return_endpoint: return_endpoint.to_string(),
        issued_at,
        nonce: STANDARD.encode(nonce),
    };
    let json = serde_json::to_vec(&descriptor)
        .map_err(|e| ApiError::Internal(format!("Failed to encode request: {}", e)))?;
    let encrypted_request = STANDARD.encode(json);
    let integrity_tag = state.key.tag(&encrypted_request);

    state
        .store
        .insert(SessionRecord {
            session_token: session_token.clone(),
            encrypted_request: encrypted_request.clone(),
            return_endpoint: descriptor.return_endpoint,
            issued_at,
        })
        .await?;

    info!(session_token = %session_token, "Minted verification session");

    Ok(Json(SessionGrant {
        session_token,
        encrypted_request,
        integrity_tag,
    }))
}

/// Verify a result submitted for a session
///
/// POST /v1/sessions/verify
///
/// The session is consumed whatever the verdict. Submitting the same result
/// again returns the recorded verdict; any other submission for a consumed
/// session is rejected.
pub async fn verify_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let fingerprint = submission_fingerprint(&state.key, &request);

    if let Some(settled) = state.store.settlement(&request.session_token).await? {
        if settled.fingerprint == fingerprint {
            info!(
                session_token = %request.session_token,
                verified = settled.verdict.verified,
                "Repeated submission answered with recorded verdict"
            );
            return Ok(Json(settled.verdict));
        }
        warn!(session_token = %request.session_token, "Different submission for a used session");
        return Ok(Json(VerifyResponse::rejected(Rejection::UnknownSession.to_string())));
    }

    let record = state.store.take(&request.session_token).await?;

    let verdict = match validate_submission(
        record.as_ref(),
        &request,
        &state.key,
        Utc::now(),
        state.config.session_ttl,
    ) {
        Ok(claims) => {
            info!(session_token = %request.session_token, "Verification accepted");
            VerifyResponse::accepted(claims)
        }
        Err(rejection) => {
            warn!(
                session_token = %request.session_token,
                reason = %rejection,
                "Verification rejected"
            );
            VerifyResponse::rejected(rejection.to_string())
        }
    };

    if let Some(record) = record {
        state
            .store
            .settle(Settlement {
                session_token: record.session_token,
                fingerprint,
                verdict: verdict.clone(),
                issued_at: record.issued_at,
            })
            .await?;
    }

    Ok(Json(verdict))
}

/// Keyed digest identifying one exact submission
fn submission_fingerprint(key: &IntegrityKey, request: &VerifyRequest) -> String {
    key.tag(&format!(
        "{}\n{}\n{}",
        request.session_token, request.encrypted_payload, request.integrity_tag
    ))
}
