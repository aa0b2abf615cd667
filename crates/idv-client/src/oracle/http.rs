//! HTTP oracle client

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

use idv_core::{CreateSessionRequest, SessionGrant, VerifyRequest, VerifyResponse};

use super::{OracleError, VerificationOracle};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Oracle reached over HTTP
///
/// - `POST {base}/v1/sessions` mints a session
/// - `POST {base}/v1/sessions/verify` validates a result
pub struct HttpOracle {
    base_url: String,
    http_client: reqwest::Client,
    timeout: Duration,
}

impl HttpOracle {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a preconfigured client
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl VerificationOracle for HttpOracle {
    async fn create_session(&self, return_endpoint: &str) -> Result<SessionGrant, OracleError> {
        let url = format!("{}/v1/sessions", self.base_url);
        debug!(url = %url, "Requesting verification session");

        let response = self
            .http_client
            .post(&url)
            .timeout(self.timeout)
            .json(&CreateSessionRequest {
                return_endpoint: return_endpoint.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Oracle refused to mint a session");
            return Err(OracleError::Rejected(format!("session request failed with {}", status)));
        }

        response
            .json::<SessionGrant>()
            .await
            .map_err(|e| OracleError::Protocol(e.to_string()))
    }

    async fn verify_result(&self, request: &VerifyRequest) -> Result<VerifyResponse, OracleError> {
        let url = format!("{}/v1/sessions/verify", self.base_url);
        debug!(url = %url, session_token = %request.session_token, "Submitting result to oracle");

        let response = self
            .http_client
            .post(&url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(OracleError::Transient(format!("oracle returned {}", status)));
        }
        if !status.is_success() {
            return Err(OracleError::Rejected(format!("oracle returned {}", status)));
        }

        response
            .json::<VerifyResponse>()
            .await
            .map_err(|e| OracleError::Protocol(e.to_string()))
    }

    fn description(&self) -> &str {
        "HTTP verification oracle"
    }
}
