//! Session lifecycle tests for the development oracle
//!
//! Drive the public handlers the way the router does and check the oracle's
//! guarantees: single use, expiry, and integrity.

use axum::{extract::State, Json};
use std::sync::Arc;

use idv_core::{CreateSessionRequest, SessionGrant, UserClaims, VerifyRequest};
use idv_oracle::api::handlers::{create_session, verify_session};
use idv_oracle::{seal_claims, AppState, IntegrityKey, MemorySessionStore, OracleConfig, SessionStore};

fn state(config: OracleConfig) -> Arc<AppState> {
    let (key, _) = IntegrityKey::generate().unwrap();
    Arc::new(AppState {
        key,
        store: Arc::new(MemorySessionStore::new()),
        config,
    })
}

async fn mint(state: &Arc<AppState>) -> SessionGrant {
    let Json(grant) = create_session(
        State(state.clone()),
        Json(CreateSessionRequest {
            return_endpoint: "http://localhost:3000/identity/bridge".into(),
        }),
    )
    .await
    .unwrap();
    grant
}

fn sealed_request(state: &AppState, grant: &SessionGrant, claims: &UserClaims) -> VerifyRequest {
    let sealed = seal_claims(&state.key, &grant.session_token, claims).unwrap();
    VerifyRequest {
        session_token: grant.session_token.clone(),
        encrypted_payload: sealed.enc_data,
        integrity_tag: sealed.integrity_value,
    }
}

#[tokio::test]
async fn test_every_session_token_is_unique() {
    let state = state(OracleConfig::default());

    let mut tokens = std::collections::HashSet::new();
    for _ in 0..50 {
        assert!(tokens.insert(mint(&state).await.session_token));
    }
    assert_eq!(state.store.count().await.unwrap(), 50);
}

#[tokio::test]
async fn test_concurrent_verifies_accept_once() {
    let state = state(OracleConfig::default());
    let grant = mint(&state).await;

    // Eight distinct, individually valid submissions race for one session
    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let state = state.clone();
            let claims = UserClaims::new().with_name(format!("User {}", i));
            let request = sealed_request(&state, &grant, &claims);
            tokio::spawn(async move { verify_session(State(state), Json(request)).await })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        let Json(verdict) = task.await.unwrap().unwrap();
        if verdict.verified {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);
}

#[tokio::test]
async fn test_resubmission_after_lost_response_gets_same_verdict() {
    let state = state(OracleConfig::default());
    let grant = mint(&state).await;
    let claims = UserClaims::new().with_name("Hong Gildong");
    let request = sealed_request(&state, &grant, &claims);

    // The first answer never reaches the client
    let Json(_lost) = verify_session(State(state.clone()), Json(request.clone())).await.unwrap();

    let Json(verdict) = verify_session(State(state.clone()), Json(request)).await.unwrap();
    assert!(verdict.verified);
    assert_eq!(verdict.claims, Some(claims));
    assert_eq!(state.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_expired_session_rejected_and_consumed() {
    let state = state(OracleConfig {
        session_ttl: chrono::Duration::zero(),
    });
    let grant = mint(&state).await;
    let request = sealed_request(&state, &grant, &UserClaims::new());

    let Json(verdict) = verify_session(State(state.clone()), Json(request)).await.unwrap();

    assert!(!verdict.verified);
    assert_eq!(verdict.reason.as_deref(), Some("session expired"));
    assert_eq!(state.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_payload_sealed_with_other_key_rejected() {
    let state = state(OracleConfig::default());
    let grant = mint(&state).await;

    let (other_key, _) = IntegrityKey::generate().unwrap();
    let sealed = seal_claims(&other_key, &grant.session_token, &UserClaims::new()).unwrap();
    let request = VerifyRequest {
        session_token: grant.session_token.clone(),
        encrypted_payload: sealed.enc_data,
        integrity_tag: sealed.integrity_value,
    };

    let Json(verdict) = verify_session(State(state), Json(request)).await.unwrap();
    assert_eq!(verdict.reason.as_deref(), Some("integrity check failed"));
}

#[tokio::test]
async fn test_claims_survive_the_trip() {
    let state = state(OracleConfig::default());
    let grant = mint(&state).await;
    let claims = UserClaims::new()
        .with_name("Hong Gildong")
        .with_phone_number("01012345678")
        .with_birth_date("19900101")
        .with_foreigner(false)
        .with_extra("gender", serde_json::json!("M"));

    let request = sealed_request(&state, &grant, &claims);
    let Json(verdict) = verify_session(State(state), Json(request)).await.unwrap();

    assert!(verdict.verified);
    assert_eq!(verdict.claims, Some(claims));
}
