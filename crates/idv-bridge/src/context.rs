//! The child browsing context the Bridge runs in

use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use idv_core::OpenerHandle;

/// Why a context did not close
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloseError {
    /// The environment refuses to close a context it did not script-open
    #[error("Context refused to close: {0}")]
    Refused(String),
}

/// What the Bridge needs from the context hosting it
pub trait ChildContext: Send + Sync {
    /// Reference to the context that opened this one, if any survives
    fn opener(&self) -> Option<OpenerHandle>;

    /// Origin this context's messages are tagged with
    fn origin(&self) -> &str;

    /// Ask the environment to close this context
    fn close(&self) -> Result<(), CloseError>;
}

/// A child context spawned by the Initiator
///
/// Closing succeeds only when the context was opened by script, matching
/// what browsers allow.
#[derive(Debug)]
pub struct SpawnedContext {
    opener: Option<OpenerHandle>,
    origin: String,
    script_opened: bool,
    closed: AtomicBool,
}

impl SpawnedContext {
    pub fn new(origin: impl Into<String>, opener: Option<OpenerHandle>) -> Self {
        Self {
            opener,
            origin: origin.into(),
            script_opened: true,
            closed: AtomicBool::new(false),
        }
    }

    /// A context the user navigated to directly; it cannot close itself
    pub fn navigated(origin: impl Into<String>) -> Self {
        Self {
            opener: None,
            origin: origin.into(),
            script_opened: false,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ChildContext for SpawnedContext {
    fn opener(&self) -> Option<OpenerHandle> {
        self.opener.clone()
    }

    fn origin(&self) -> &str {
        &self.origin
    }

    fn close(&self) -> Result<(), CloseError> {
        if !self.script_opened {
            return Err(CloseError::Refused("not opened by script".into()));
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
