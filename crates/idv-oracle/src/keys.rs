//! Integrity key for the development oracle
//!
//! Stands in for the provider's sealing key: it tags the request descriptors
//! the oracle mints and checks the tags on payloads the provider sends back.
//! Tags are `base64(HMAC-SHA256(key, data))`.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;
use tracing::info;

use idv_core::{SessionToken, UserClaims};

type HmacSha256 = Hmac<Sha256>;

/// Length of generated secrets, in bytes
pub const SECRET_LEN: usize = 32;

/// Errors constructing or using an integrity key
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Integrity key is empty")]
    Empty,

    #[error("Invalid integrity key encoding: {0}")]
    Encoding(String),

    #[error("Invalid integrity key: {0}")]
    Invalid(String),

    #[error("Failed to encode sealed payload: {0}")]
    Seal(String),
}

/// Where an oracle's key came from
pub enum KeySource {
    /// Supplied by the operator
    Configured,
    /// Generated at startup; carries the base64 secret for the provider side
    Ephemeral(String),
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Configured => f.write_str("Configured"),
            KeySource::Ephemeral(_) => f.write_str("Ephemeral(..)"),
        }
    }
}

/// HMAC-SHA256 key shared between the oracle and the (simulated) provider
#[derive(Clone)]
pub struct IntegrityKey {
    mac: HmacSha256,
}

impl IntegrityKey {
    /// Build a key from raw secret bytes
    pub fn from_secret(secret: &[u8]) -> Result<Self, KeyError> {
        if secret.is_empty() {
            return Err(KeyError::Empty);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|e| KeyError::Invalid(e.to_string()))?;
        Ok(Self { mac })
    }

    /// Build a key from a base64-encoded secret (as found in the environment)
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let secret = STANDARD
            .decode(encoded.trim())
            .map_err(|e| KeyError::Encoding(e.to_string()))?;
        Self::from_secret(&secret)
    }

    /// Generate a random key
    ///
    /// Returns the key together with its base64 secret so it can be handed to
    /// whatever plays the provider.
    pub fn generate() -> Result<(Self, String), KeyError> {
        let mut secret = [0u8; SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut secret);

        let key = Self::from_secret(&secret)?;
        info!("Generated ephemeral integrity key");

        Ok((key, STANDARD.encode(secret)))
    }

    /// Use the configured base64 secret, or generate one when there is none
    pub fn load(encoded: Option<&str>) -> Result<(Self, KeySource), KeyError> {
        match encoded {
            Some(encoded) => Ok((Self::from_base64(encoded)?, KeySource::Configured)),
            None => {
                let (key, secret) = Self::generate()?;
                Ok((key, KeySource::Ephemeral(secret)))
            }
        }
    }

    /// Integrity tag for `data`
    pub fn tag(&self, data: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(data.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Check a tag in constant time
    pub fn verify(&self, data: &str, tag: &str) -> bool {
        let Ok(expected) = STANDARD.decode(tag) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(data.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

impl fmt::Debug for IntegrityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrityKey").finish_non_exhaustive()
    }
}

/// What the provider seals into `enc_data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedPayload {
    pub session_token: SessionToken,
    pub claims: UserClaims,
}

/// A provider-style `(enc_data, integrity_value)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedClaims {
    pub enc_data: String,
    pub integrity_value: String,
}

/// Seal claims for a session the way the provider would
///
/// Used by tests and demos to play the provider against this oracle.
pub fn seal_claims(
    key: &IntegrityKey,
    session_token: &SessionToken,
    claims: &UserClaims,
) -> Result<SealedClaims, KeyError> {
    let payload = SealedPayload {
        session_token: session_token.clone(),
        claims: claims.clone(),
    };
    let json = serde_json::to_vec(&payload).map_err(|e| KeyError::Seal(e.to_string()))?;
    let enc_data = STANDARD.encode(json);
    let integrity_value = key.tag(&enc_data);

    Ok(SealedClaims {
        enc_data,
        integrity_value,
    })
}

/// Decode a sealed payload without checking its tag
pub fn open_payload(enc_data: &str) -> Option<SealedPayload> {
    let json = STANDARD.decode(enc_data).ok()?;
    serde_json::from_slice(&json).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_verifies() {
        let (key, _) = IntegrityKey::generate().unwrap();
        let tag = key.tag("payload");

        assert!(key.verify("payload", &tag));
        assert!(!key.verify("payload2", &tag));
        assert!(!key.verify("payload", "not base64!"));
    }

    #[test]
    fn test_keys_do_not_cross_verify() {
        let (a, _) = IntegrityKey::generate().unwrap();
        let (b, _) = IntegrityKey::generate().unwrap();

        assert!(!b.verify("payload", &a.tag("payload")));
    }

    #[test]
    fn test_base64_roundtrip_keeps_key() {
        let (key, secret) = IntegrityKey::generate().unwrap();
        let restored = IntegrityKey::from_base64(&secret).unwrap();

        assert_eq!(key.tag("x"), restored.tag("x"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert_eq!(IntegrityKey::from_secret(&[]).unwrap_err(), KeyError::Empty);
        assert!(matches!(IntegrityKey::from_base64("%%%"), Err(KeyError::Encoding(_))));
    }

    #[test]
    fn test_sealed_claims_open() {
        let (key, _) = IntegrityKey::generate().unwrap();
        let token = SessionToken::new("S1");
        let claims = UserClaims::new().with_name("Hong Gildong");

        let sealed = seal_claims(&key, &token, &claims).unwrap();
        assert!(key.verify(&sealed.enc_data, &sealed.integrity_value));

        let payload = open_payload(&sealed.enc_data).unwrap();
        assert_eq!(payload.session_token, token);
        assert_eq!(payload.claims, claims);
    }

    #[test]
    fn test_debug_hides_secret() {
        let key = IntegrityKey::from_secret(b"super-secret").unwrap();
        assert!(!format!("{:?}", key).contains("super"));
    }

    #[test]
    fn test_load_prefers_configured_secret() {
        let (original, secret) = IntegrityKey::generate().unwrap();

        let (key, source) = IntegrityKey::load(Some(&secret)).unwrap();
        assert!(matches!(source, KeySource::Configured));
        assert_eq!(key.tag("x"), original.tag("x"));

        assert!(matches!(IntegrityKey::load(Some("%%%")), Err(KeyError::Encoding(_))));
    }

    #[test]
    fn test_ephemeral_source_keeps_secret_out_of_debug() {
        let (key, source) = IntegrityKey::load(None).unwrap();
        let KeySource::Ephemeral(secret) = &source else {
            panic!("Expected an ephemeral key, got {:?}", source);
        };

        assert_eq!(IntegrityKey::from_base64(secret).unwrap().tag("x"), key.tag("x"));
        assert!(!format!("{:?}", source).contains(secret.as_str()));
    }
}
