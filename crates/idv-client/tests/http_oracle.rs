//! HttpOracle against a real oracle router on an ephemeral port

use async_trait::async_trait;
use axum::{http::StatusCode, routing::post, Json, Router};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use idv_bridge::{Bridge, BridgeConfig, SpawnedContext};
use idv_client::{
    ContextOpener, HandshakeConfig, HttpOracle, Initiator, OpenError, OracleError,
    ProviderLaunch, VerificationOracle,
};
use idv_core::{
    HandshakeOutcome, MemoryStorage, OpenerHandle, RejectReason, SessionGrant, SessionToken,
    SharedResultStore, SystemClock, UserClaims, VerifyRequest, VerifyResponse,
};
use idv_oracle::{
    create_router, seal_claims, AppState, IntegrityKey, MemorySessionStore, OracleConfig,
};

const RETURN_ENDPOINT: &str = "http://localhost:3000/identity/bridge";

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn start_oracle() -> (String, IntegrityKey) {
    let (key, _) = IntegrityKey::generate().unwrap();
    let state = Arc::new(AppState {
        key: key.clone(),
        store: Arc::new(MemorySessionStore::new()),
        config: OracleConfig::default(),
    });
    (serve(create_router(state)).await, key)
}

fn claims() -> UserClaims {
    UserClaims::new().with_name("Hong Gildong").with_birth_date("19900101")
}

#[tokio::test]
async fn test_mint_and_verify_over_http() {
    let (base_url, key) = start_oracle().await;
    let oracle = HttpOracle::new(base_url);

    let grant = oracle.create_session(RETURN_ENDPOINT).await.unwrap();
    assert!(!grant.session_token.is_empty());
    assert!(key.verify(&grant.encrypted_request, &grant.integrity_tag));

    let sealed = seal_claims(&key, &grant.session_token, &claims()).unwrap();
    let request = VerifyRequest {
        session_token: grant.session_token.clone(),
        encrypted_payload: sealed.enc_data,
        integrity_tag: sealed.integrity_value,
    };

    let verdict = oracle.verify_result(&request).await.unwrap();
    assert!(verdict.verified);
    assert_eq!(verdict.claims, Some(claims()));

    let repeat = oracle.verify_result(&request).await.unwrap();
    assert_eq!(repeat, verdict);
}

#[tokio::test]
async fn test_bad_return_endpoint_is_rejected() {
    let (base_url, _) = start_oracle().await;
    let oracle = HttpOracle::new(base_url);

    let err = oracle.create_session("not a url").await.unwrap_err();
    assert!(matches!(err, OracleError::Rejected(_)));
}

/// Plays the provider: seals claims with the oracle's key and redirects to
/// the Bridge
struct SealingProvider {
    key: IntegrityKey,
    profile: Arc<MemoryStorage>,
}

#[async_trait]
impl ContextOpener for SealingProvider {
    async fn open(&self, launch: ProviderLaunch, opener: OpenerHandle) -> Result<(), OpenError> {
        let sealed = seal_claims(&self.key, &launch.session_token, &claims())
            .map_err(|e| OpenError::Blocked(e.to_string()))?;

        let mut redirect =
            Url::parse(RETURN_ENDPOINT).map_err(|e| OpenError::InvalidAddress(e.to_string()))?;
        redirect
            .query_pairs_mut()
            .append_pair("enc_data", &sealed.enc_data)
            .append_pair("token_version_id", launch.session_token.as_str())
            .append_pair("integrity_value", &sealed.integrity_value);

        let bridge = Bridge::new(SharedResultStore::new(self.profile.clone()), Arc::new(SystemClock))
            .with_config(BridgeConfig {
                close_delay: Duration::from_millis(50),
            });
        let context = SpawnedContext::new("http://localhost:3000", Some(opener));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            bridge.handle_redirect(redirect.as_str(), &context).await;
        });
        Ok(())
    }
}

fn fast_config() -> HandshakeConfig {
    HandshakeConfig::default()
        .with_return_endpoint(RETURN_ENDPOINT)
        .with_poll_interval(Duration::from_millis(50))
        .with_result_timeout(Duration::from_secs(10))
        .with_transient_retries(2, Duration::from_millis(20))
}

#[tokio::test]
async fn test_full_handshake_over_http() {
    let (base_url, key) = start_oracle().await;
    let profile = Arc::new(MemoryStorage::new());

    let initiator = Initiator::new(
        Arc::new(HttpOracle::new(base_url)),
        Arc::new(SealingProvider {
            key,
            profile: profile.clone(),
        }),
        SharedResultStore::new(profile),
        Arc::new(SystemClock),
        fast_config(),
    );

    let outcome = initiator.begin().await.unwrap();
    assert_eq!(outcome, HandshakeOutcome::Verified(claims()));
}

/// Forwards to a real oracle but drops the first verify response on the floor
struct LossyOracle {
    inner: HttpOracle,
    verify_calls: AtomicUsize,
}

#[async_trait]
impl VerificationOracle for LossyOracle {
    async fn create_session(&self, return_endpoint: &str) -> Result<SessionGrant, OracleError> {
        self.inner.create_session(return_endpoint).await
    }

    async fn verify_result(&self, request: &VerifyRequest) -> Result<VerifyResponse, OracleError> {
        let verdict = self.inner.verify_result(request).await;
        if self.verify_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(OracleError::Transient("connection reset after send".into()));
        }
        verdict
    }
}

#[tokio::test]
async fn test_lost_verify_response_still_verifies() {
    let (base_url, key) = start_oracle().await;
    let profile = Arc::new(MemoryStorage::new());
    let oracle = Arc::new(LossyOracle {
        inner: HttpOracle::new(base_url),
        verify_calls: AtomicUsize::new(0),
    });

    let initiator = Initiator::new(
        oracle.clone(),
        Arc::new(SealingProvider {
            key,
            profile: profile.clone(),
        }),
        SharedResultStore::new(profile),
        Arc::new(SystemClock),
        fast_config(),
    );

    let outcome = initiator.begin().await.unwrap();

    assert_eq!(outcome, HandshakeOutcome::Verified(claims()));
    assert_eq!(oracle.verify_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unavailable_oracle_exhausts_retries() {
    let verify_attempts = Arc::new(AtomicUsize::new(0));

    let router = Router::new()
        .route(
            "/v1/sessions",
            post(|| async {
                Json(SessionGrant {
                    session_token: SessionToken::new("S1"),
                    encrypted_request: "req".into(),
                    integrity_tag: "tag".into(),
                })
            }),
        )
        .route(
            "/v1/sessions/verify",
            post({
                let attempts = verify_attempts.clone();
                move || async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    StatusCode::SERVICE_UNAVAILABLE
                }
            }),
        );
    let base_url = serve(router).await;
    let (key, _) = IntegrityKey::generate().unwrap();
    let profile = Arc::new(MemoryStorage::new());

    let initiator = Initiator::new(
        Arc::new(HttpOracle::new(base_url)),
        Arc::new(SealingProvider {
            key,
            profile: profile.clone(),
        }),
        SharedResultStore::new(profile),
        Arc::new(SystemClock),
        fast_config(),
    );

    let outcome = initiator.begin().await.unwrap();

    assert_eq!(outcome, HandshakeOutcome::Rejected(RejectReason::Transient));
    assert_eq!(verify_attempts.load(Ordering::SeqCst), 3);
}
