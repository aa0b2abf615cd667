//! Mock oracle
//!
//! For testing purposes - scripted sessions and verdicts, with call counts.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use idv_core::{SessionGrant, SessionToken, UserClaims, VerifyRequest, VerifyResponse};

use super::{OracleError, VerificationOracle};

/// Mock oracle for testing
///
/// Without scripting, every session request mints `mock-session-{n}` and
/// every verification is accepted with the default claims.
pub struct MockOracle {
    grants: Mutex<VecDeque<Result<SessionGrant, OracleError>>>,
    verdicts: Mutex<VecDeque<Result<VerifyResponse, OracleError>>>,
    verify_requests: Mutex<Vec<VerifyRequest>>,
    default_claims: UserClaims,
    latency: Duration,
    create_calls: AtomicUsize,
    verify_calls: AtomicUsize,
}

impl MockOracle {
    pub fn new() -> Self {
        Self {
            grants: Mutex::new(VecDeque::new()),
            verdicts: Mutex::new(VecDeque::new()),
            verify_requests: Mutex::new(Vec::new()),
            default_claims: UserClaims::new().with_name("Mock User"),
            latency: Duration::ZERO,
            create_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
        }
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Claims returned by unscripted verifications
    pub fn with_claims(mut self, claims: UserClaims) -> Self {
        self.default_claims = claims;
        self
    }

    /// Queue the response to the next session request
    pub fn push_grant(&self, grant: Result<SessionGrant, OracleError>) {
        lock(&self.grants).push_back(grant);
    }

    /// Queue a session grant for the given token
    pub fn push_session(&self, token: &str) {
        self.push_grant(Ok(SessionGrant {
            session_token: SessionToken::new(token),
            encrypted_request: format!("{}-request", token),
            integrity_tag: format!("{}-integrity", token),
        }));
    }

    /// Queue the response to the next verification
    pub fn push_verdict(&self, verdict: Result<VerifyResponse, OracleError>) {
        lock(&self.verdicts).push_back(verdict);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    /// Every verification request received so far
    pub fn verify_requests(&self) -> Vec<VerifyRequest> {
        lock(&self.verify_requests).clone()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl VerificationOracle for MockOracle {
    async fn create_session(&self, _return_endpoint: &str) -> Result<SessionGrant, OracleError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.simulate_latency().await;

        let scripted = lock(&self.grants).pop_front();
        scripted.unwrap_or_else(|| {
            Ok(SessionGrant {
                session_token: SessionToken::new(format!("mock-session-{}", n)),
                encrypted_request: format!("mock-request-{}", n),
                integrity_tag: format!("mock-integrity-{}", n),
            })
        })
    }

    async fn verify_result(&self, request: &VerifyRequest) -> Result<VerifyResponse, OracleError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.verify_requests).push(request.clone());
        self.simulate_latency().await;

        let scripted = lock(&self.verdicts).pop_front();
        scripted.unwrap_or_else(|| Ok(VerifyResponse::accepted(self.default_claims.clone())))
    }

    fn description(&self) -> &str {
        "mock verification oracle"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unscripted_sessions_are_numbered() {
        let oracle = MockOracle::new();

        let first = oracle.create_session("http://localhost/bridge").await.unwrap();
        let second = oracle.create_session("http://localhost/bridge").await.unwrap();

        assert_eq!(first.session_token.as_str(), "mock-session-1");
        assert_eq!(second.session_token.as_str(), "mock-session-2");
        assert_eq!(oracle.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_scripted_verdicts_in_order() {
        let oracle = MockOracle::new();
        oracle.push_verdict(Err(OracleError::Transient("down".into())));
        oracle.push_verdict(Ok(VerifyResponse::rejected("integrity mismatch")));

        let request = VerifyRequest {
            session_token: SessionToken::new("S1"),
            encrypted_payload: "enc".into(),
            integrity_tag: "tag".into(),
        };

        assert!(oracle.verify_result(&request).await.unwrap_err().is_transient());
        assert!(!oracle.verify_result(&request).await.unwrap().verified);
        assert!(oracle.verify_result(&request).await.unwrap().verified);
        assert_eq!(oracle.verify_calls(), 3);
        assert_eq!(oracle.verify_requests().len(), 3);
    }
}
