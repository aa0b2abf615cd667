//! Backend trust oracle clients
//!
//! The oracle holds the key material needed to validate the provider's
//! payload. The handshake treats it as opaque: it mints sessions and
//! returns verdicts.

pub mod http;
pub mod mock;

pub use http::HttpOracle;
pub use mock::MockOracle;

use async_trait::async_trait;
use thiserror::Error;

use idv_core::{SessionGrant, VerifyRequest, VerifyResponse};

/// Errors talking to the oracle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// Unreachable, timed out, or temporarily failing; safe to resubmit
    #[error("Oracle unavailable: {0}")]
    Transient(String),

    /// The oracle answered with a refusal
    #[error("Oracle refused request: {0}")]
    Rejected(String),

    /// The oracle answered with something we could not understand
    #[error("Unexpected oracle response: {0}")]
    Protocol(String),
}

impl OracleError {
    pub fn is_transient(&self) -> bool {
        matches!(self, OracleError::Transient(_))
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return OracleError::Transient(err.to_string());
        }
        match err.status() {
            Some(status) if status.is_server_error() => OracleError::Transient(err.to_string()),
            Some(_) => OracleError::Rejected(err.to_string()),
            None => OracleError::Protocol(err.to_string()),
        }
    }
}

/// The two backend operations the handshake consumes
#[async_trait]
pub trait VerificationOracle: Send + Sync {
    /// Mint a signed verification session whose provider redirect returns to
    /// `return_endpoint`
    async fn create_session(&self, return_endpoint: &str) -> Result<SessionGrant, OracleError>;

    /// Ask the oracle to validate a delivered result
    async fn verify_result(&self, request: &VerifyRequest) -> Result<VerifyResponse, OracleError>;

    /// Get a description of this oracle (for logging)
    fn description(&self) -> &str {
        "verification oracle"
    }
}
