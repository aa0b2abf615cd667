//! Handshake configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Tunables for one Initiator
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// How often the shared store is checked while awaiting a result
    pub poll_interval: Duration,
    /// How long to wait for a result before giving up
    pub result_timeout: Duration,
    /// How long a minted session stays usable for resubmission
    pub session_ttl: Duration,
    /// Resubmissions after a transient oracle failure
    pub transient_retries: u32,
    /// Pause between resubmissions
    pub retry_backoff: Duration,
    /// Provider entry point the child context is opened on
    pub provider_url: String,
    /// Bridge address the provider redirects back to
    pub return_endpoint: String,
    /// Origin cross-context messages must come from; derived from
    /// `return_endpoint` when unset
    pub trusted_origin: Option<String>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            result_timeout: Duration::from_secs(300),
            session_ttl: Duration::from_secs(600),
            transient_retries: 2,
            retry_backoff: Duration::from_millis(500),
            provider_url: "https://nice.checkplus.co.kr/CheckPlusSafeModel/service.cb".to_string(),
            return_endpoint: "http://localhost:3000/identity/bridge".to_string(),
            trusted_origin: None,
        }
    }
}

impl HandshakeConfig {
    /// Load from `IDV_*` environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            poll_interval: env_parse("IDV_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            result_timeout: env_parse("IDV_RESULT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.result_timeout),
            session_ttl: env_parse("IDV_SESSION_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            transient_retries: env_parse("IDV_TRANSIENT_RETRIES").unwrap_or(defaults.transient_retries),
            retry_backoff: env_parse("IDV_RETRY_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            provider_url: env::var("IDV_PROVIDER_URL").unwrap_or(defaults.provider_url),
            return_endpoint: env::var("IDV_RETURN_ENDPOINT").unwrap_or(defaults.return_endpoint),
            trusted_origin: env::var("IDV_TRUSTED_ORIGIN").ok(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_result_timeout(mut self, timeout: Duration) -> Self {
        self.result_timeout = timeout;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_transient_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.transient_retries = retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn with_provider_url(mut self, url: impl Into<String>) -> Self {
        self.provider_url = url.into();
        self
    }

    pub fn with_return_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.return_endpoint = endpoint.into();
        self
    }

    /// Origin cross-context messages are accepted from
    pub fn trusted_origin(&self) -> Option<String> {
        if let Some(origin) = &self.trusted_origin {
            return Some(origin.clone());
        }
        match Url::parse(&self.return_endpoint) {
            Ok(url) => Some(url.origin().ascii_serialization()),
            Err(e) => {
                warn!(endpoint = %self.return_endpoint, error = %e, "Cannot derive trusted origin");
                None
            }
        }
    }

    pub(crate) fn session_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.session_ttl).unwrap_or_else(|_| chrono::Duration::days(36_500))
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key = %key, value = %raw, "Ignoring unparseable configuration value");
            None
        }
    }
}
