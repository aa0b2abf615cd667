//! In-memory storage backend
//!
//! Default storage implementation using an in-memory hashmap.
//! Sessions are lost on restart, which only costs users a retry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};

use idv_core::SessionToken;

use super::{SessionRecord, SessionStore, Settlement, StorageError};

/// In-memory session store implementation
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionToken, SessionRecord>>,
    settled: RwLock<HashMap<SessionToken, Settlement>>,
}

impl MemorySessionStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, record: SessionRecord) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().map_err(|_| StorageError::Poisoned)?;
        if sessions.contains_key(&record.session_token) {
            return Err(StorageError::AlreadyExists(record.session_token.to_string()));
        }
        debug!(session_token = %record.session_token, "Storing session");
        sessions.insert(record.session_token.clone(), record);
        Ok(())
    }

    async fn get(&self, token: &SessionToken) -> Result<Option<SessionRecord>, StorageError> {
        let sessions = self.sessions.read().map_err(|_| StorageError::Poisoned)?;
        Ok(sessions.get(token).cloned())
    }

    async fn take(&self, token: &SessionToken) -> Result<Option<SessionRecord>, StorageError> {
        let mut sessions = self.sessions.write().map_err(|_| StorageError::Poisoned)?;
        Ok(sessions.remove(token))
    }

    async fn settle(&self, settlement: Settlement) -> Result<(), StorageError> {
        let mut settled = self.settled.write().map_err(|_| StorageError::Poisoned)?;
        debug!(
            session_token = %settlement.session_token,
            verified = settlement.verdict.verified,
            "Recording verdict"
        );
        settled.insert(settlement.session_token.clone(), settlement);
        Ok(())
    }

    async fn settlement(&self, token: &SessionToken) -> Result<Option<Settlement>, StorageError> {
        let settled = self.settled.read().map_err(|_| StorageError::Poisoned)?;
        Ok(settled.get(token).cloned())
    }

    async fn purge_issued_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        self.settled
            .write()
            .map_err(|_| StorageError::Poisoned)?
            .retain(|_, settlement| settlement.issued_at >= cutoff);

        let mut sessions = self.sessions.write().map_err(|_| StorageError::Poisoned)?;
        let before = sessions.len();
        sessions.retain(|_, record| record.issued_at >= cutoff);
        let purged = before - sessions.len();
        if purged > 0 {
            info!(purged = purged, "Purged expired sessions");
        }
        Ok(purged)
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let sessions = self.sessions.read().map_err(|_| StorageError::Poisoned)?;
        Ok(sessions.len())
    }
}
