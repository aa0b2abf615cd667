//! Cross-context channel
//!
//! Best-effort push delivery from a child browsing context back to the
//! context that opened it. One channel is opened per handshake attempt: the
//! child receives the [`OpenerHandle`] (its reference to the opener) and the
//! opener keeps the [`ChannelListener`]. Dropping the listener detaches it;
//! later posts fail with [`ChannelError::Closed`].

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::ResultMessage;

/// Errors from posting to the opener
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The opener is gone or no longer listening
    #[error("Opener context is closed")]
    Closed,

    /// Messaging was refused by the environment's security policy
    #[error("Cross-context messaging blocked: {0}")]
    Blocked(String),
}

/// A posted message together with the sender's origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub origin: String,
    pub message: ResultMessage,
}

/// Factory for per-attempt channels
pub struct CrossContextChannel;

impl CrossContextChannel {
    /// Open a fresh channel for one attempt
    pub fn open() -> (OpenerHandle, ChannelListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            OpenerHandle {
                inner: HandleInner::Connected(tx),
            },
            ChannelListener {
                rx,
                trusted_origin: None,
            },
        )
    }
}

#[derive(Debug, Clone)]
enum HandleInner {
    Connected(mpsc::UnboundedSender<Envelope>),
    Blocked(String),
}

/// The child context's reference to its opener
#[derive(Debug, Clone)]
pub struct OpenerHandle {
    inner: HandleInner,
}

impl OpenerHandle {
    /// A handle whose every post is refused
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            inner: HandleInner::Blocked(reason.into()),
        }
    }

    /// Whether the opener has stopped listening
    ///
    /// A blocked handle does not know; it reports open and fails on post.
    pub fn is_closed(&self) -> bool {
        match &self.inner {
            HandleInner::Connected(tx) => tx.is_closed(),
            HandleInner::Blocked(_) => false,
        }
    }

    /// Post a message to the opener, tagged with the sender's origin
    pub fn post(&self, origin: &str, message: ResultMessage) -> Result<(), ChannelError> {
        match &self.inner {
            HandleInner::Connected(tx) => tx
                .send(Envelope {
                    origin: origin.to_string(),
                    message,
                })
                .map_err(|_| ChannelError::Closed),
            HandleInner::Blocked(reason) => Err(ChannelError::Blocked(reason.clone())),
        }
    }
}

/// The opener's end of the channel
#[derive(Debug)]
pub struct ChannelListener {
    rx: mpsc::UnboundedReceiver<Envelope>,
    trusted_origin: Option<String>,
}

impl ChannelListener {
    /// Only accept envelopes from this origin
    pub fn trust_origin(mut self, origin: impl Into<String>) -> Self {
        self.trusted_origin = Some(origin.into());
        self
    }

    /// Wait for the next message from a trusted origin
    ///
    /// Returns `None` once every handle has been dropped.
    pub async fn recv(&mut self) -> Option<ResultMessage> {
        while let Some(envelope) = self.rx.recv().await {
            match &self.trusted_origin {
                Some(trusted) if *trusted != envelope.origin => {
                    warn!(
                        origin = %envelope.origin,
                        trusted = %trusted,
                        "Dropped cross-context message from untrusted origin"
                    );
                }
                _ => {
                    debug!(origin = %envelope.origin, message = %envelope.message, "Received cross-context message");
                    return Some(envelope.message);
                }
            }
        }
        None
    }
}
