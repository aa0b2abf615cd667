//! Opening the provider in a separate browsing context

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use idv_core::{OpenerHandle, SessionToken, VerificationSession};

/// Provider service mode sent as `m`
pub const SERVICE_MODE: &str = "service";

/// Everything the provider needs to start verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderLaunch {
    pub provider_url: String,
    pub session_token: SessionToken,
    pub encrypted_request: String,
    pub integrity_tag: String,
}

impl ProviderLaunch {
    pub fn for_session(provider_url: impl Into<String>, session: &VerificationSession) -> Self {
        Self {
            provider_url: provider_url.into(),
            session_token: session.session_token.clone(),
            encrypted_request: session.encrypted_request.clone(),
            integrity_tag: session.integrity_tag.clone(),
        }
    }

    /// Fields as the provider expects them in its entry form
    ///
    /// `request_no` repeats the session token; the provider echoes it back,
    /// so a redirect that lost `token_version_id` can still be attributed.
    pub fn form_fields(&self) -> [(&'static str, &str); 5] {
        [
            ("m", SERVICE_MODE),
            ("token_version_id", self.session_token.as_str()),
            ("enc_data", &self.encrypted_request),
            ("integrity_value", &self.integrity_tag),
            ("request_no", self.session_token.as_str()),
        ]
    }

    /// The launch as a single address, for openers that navigate by URL
    pub fn to_url(&self) -> Result<Url, OpenError> {
        let mut url =
            Url::parse(&self.provider_url).map_err(|e| OpenError::InvalidAddress(e.to_string()))?;
        url.query_pairs_mut().extend_pairs(self.form_fields());
        Ok(url)
    }
}

/// Why the child context could not be opened
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OpenError {
    /// The environment refused to open a new context (popup blocker)
    #[error("Context blocked: {0}")]
    Blocked(String),

    #[error("Invalid provider address: {0}")]
    InvalidAddress(String),
}

/// Opens the provider in a new, independently navigable context
///
/// The opener hands `opener` to the child so it can post back; the child
/// may lose or never use it.
#[async_trait]
pub trait ContextOpener: Send + Sync {
    async fn open(&self, launch: ProviderLaunch, opener: OpenerHandle) -> Result<(), OpenError>;
}
