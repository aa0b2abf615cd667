//! Provider redirect parsing

use url::{form_urlencoded, Url};

use idv_core::SessionToken;

use crate::error::{BridgeError, Result};

/// Encrypted verification payload
pub const ENC_DATA: &str = "enc_data";
/// Echo of the session token
pub const TOKEN_VERSION_ID: &str = "token_version_id";
/// Integrity tag over `enc_data`
pub const INTEGRITY_VALUE: &str = "integrity_value";
/// Request number sent at launch, echoed back by the provider
pub const REQUEST_NO: &str = "request_no";

/// Raw parameters of a provider redirect, before validation
///
/// Empty values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectParams {
    pub enc_data: Option<String>,
    pub token_version_id: Option<String>,
    pub integrity_value: Option<String>,
    pub request_no: Option<String>,
}

/// A complete provider redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRedirect {
    pub enc_data: String,
    pub token_version_id: String,
    pub integrity_value: String,
    pub request_no: Option<String>,
}

impl RedirectParams {
    /// Parse the redirect address the child context landed on
    pub fn parse(redirect_url: &str) -> Result<Self> {
        let url = Url::parse(redirect_url)?;
        Ok(Self::from_url(&url))
    }

    pub fn from_url(url: &Url) -> Self {
        Self::from_query(url.query().unwrap_or_default())
    }

    /// Parse a bare `a=b&c=d` query string
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            let slot = match &*key {
                ENC_DATA => &mut params.enc_data,
                TOKEN_VERSION_ID => &mut params.token_version_id,
                INTEGRITY_VALUE => &mut params.integrity_value,
                REQUEST_NO => &mut params.request_no,
                _ => continue,
            };
            // First occurrence wins
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }

    /// Names of the required parameters that are absent
    pub fn missing(&self) -> Vec<&'static str> {
        [
            (ENC_DATA, &self.enc_data),
            (TOKEN_VERSION_ID, &self.token_version_id),
            (INTEGRITY_VALUE, &self.integrity_value),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name)
        .collect()
    }

    /// Best available session token: `token_version_id`, then `request_no`
    pub fn session_token(&self) -> SessionToken {
        self.token_version_id
            .as_deref()
            .or(self.request_no.as_deref())
            .map(SessionToken::new)
            .unwrap_or_default()
    }

    /// Validate that every required parameter is present
    pub fn into_redirect(self) -> Result<ProviderRedirect> {
        match (self.enc_data, self.token_version_id, self.integrity_value) {
            (Some(enc_data), Some(token_version_id), Some(integrity_value)) => Ok(ProviderRedirect {
                enc_data,
                token_version_id,
                integrity_value,
                request_no: self.request_no,
            }),
            (enc_data, token_version_id, integrity_value) => {
                let partial = RedirectParams {
                    enc_data,
                    token_version_id,
                    integrity_value,
                    request_no: None,
                };
                Err(BridgeError::MissingParameter(partial.missing()))
            }
        }
    }
}
