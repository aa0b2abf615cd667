//! Session storage for the development oracle
//!
//! A minted session lives here until its first verify attempt takes it out.
//! The verdict that attempt received is then kept as a [`Settlement`], so a
//! client that lost the response can ask again and hear the same answer.
//! Only an in-memory backend exists; the trait is the seam for anything
//! persistent.

pub mod memory;

pub use memory::MemorySessionStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use idv_core::{SessionToken, VerifyResponse};

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// A session minted by `POST /v1/sessions`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_token: SessionToken,
    /// Opaque request descriptor handed to the provider
    pub encrypted_request: String,
    pub return_endpoint: String,
    pub issued_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.issued_at >= ttl
    }
}

/// The verdict a consumed session was given
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub session_token: SessionToken,
    /// Keyed digest of the submission that consumed the session
    pub fingerprint: String,
    pub verdict: VerifyResponse,
    /// Issue time of the consumed session, for purging
    pub issued_at: DateTime<Utc>,
}

/// Storage backend trait for minted sessions
///
/// Implementations must be thread-safe and support concurrent access.
/// `take` must be atomic: two concurrent takes of one token yield the
/// record at most once.
#[async_trait]
pub trait SessionStore: Send + Sync + Debug {
    /// Store a freshly minted session
    async fn insert(&self, record: SessionRecord) -> Result<(), StorageError>;

    /// Look a session up without consuming it
    async fn get(&self, token: &SessionToken) -> Result<Option<SessionRecord>, StorageError>;

    /// Remove and return a session
    async fn take(&self, token: &SessionToken) -> Result<Option<SessionRecord>, StorageError>;

    /// Record the verdict for a session that has been taken
    async fn settle(&self, settlement: Settlement) -> Result<(), StorageError>;

    /// The recorded verdict for a consumed session, if any
    async fn settlement(&self, token: &SessionToken) -> Result<Option<Settlement>, StorageError>;

    /// Drop every session and settlement issued before `cutoff`, returning
    /// how many sessions went
    async fn purge_issued_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError>;

    /// Number of live (not yet verified) sessions
    async fn count(&self) -> Result<usize, StorageError>;
}
