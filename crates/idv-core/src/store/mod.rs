//! Shared result store
//!
//! The durable delivery channel between the child context (Bridge) and the
//! parent context (Initiator/Finalizer). It models the browser profile's
//! string key/value storage: any context in the same profile sees the same
//! entries, and entries persist until somebody removes them.
//!
//! [`SharedResultStore`] holds at most one pending [`ResultMessage`] under a
//! fixed well-known key. Writers always overwrite; readers delete on read.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::types::ResultMessage;

/// Well-known key the pending result lives under
pub const RESULT_KEY: &str = "idv.verification_result";

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt result entry: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// String key/value storage shared by every context of a browser profile
///
/// Implementations must be safe to share across tasks.
#[async_trait]
pub trait ProfileStorage: Send + Sync + Debug {
    /// Read an item without removing it
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write an item, replacing any previous value
    async fn set_item(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Remove an item; returns whether it existed
    async fn remove_item(&self, key: &str) -> Result<bool, StoreError>;

    /// Read and remove an item
    ///
    /// The default is a plain get followed by remove. Backends that can do
    /// better should make this a single step.
    async fn take_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self.get_item(key).await?;
        if value.is_some() {
            self.remove_item(key).await?;
        }
        Ok(value)
    }
}

/// Single-key result store with read-clears semantics
#[derive(Debug, Clone)]
pub struct SharedResultStore {
    storage: Arc<dyn ProfileStorage>,
    key: String,
}

impl SharedResultStore {
    /// Create a store over the given profile storage, using [`RESULT_KEY`]
    pub fn new(storage: Arc<dyn ProfileStorage>) -> Self {
        Self::with_key(storage, RESULT_KEY)
    }

    /// Create a store using a custom key
    pub fn with_key(storage: Arc<dyn ProfileStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Publish a message, overwriting whatever was pending
    pub async fn publish(&self, message: &ResultMessage) -> Result<(), StoreError> {
        let serialized =
            serde_json::to_string(message).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.storage.set_item(&self.key, serialized).await?;
        debug!(key = %self.key, message = %message, "Published result to shared store");
        Ok(())
    }

    /// Take the pending message, removing it from the store
    ///
    /// A corrupt entry is removed as well and reported as [`StoreError::Corrupt`].
    pub async fn take(&self) -> Result<Option<ResultMessage>, StoreError> {
        let Some(raw) = self.storage.take_item(&self.key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(message) => Ok(Some(message)),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Discarded corrupt result entry");
                Err(StoreError::Corrupt(e.to_string()))
            }
        }
    }

    /// Inspect the pending message without consuming it
    pub async fn peek(&self) -> Result<Option<ResultMessage>, StoreError> {
        match self.storage.get_item(&self.key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(e.to_string())),
            None => Ok(None),
        }
    }

    /// Drop whatever is pending
    pub async fn clear(&self) -> Result<(), StoreError> {
        if self.storage.remove_item(&self.key).await? {
            debug!(key = %self.key, "Cleared pending result");
        }
        Ok(())
    }
}
