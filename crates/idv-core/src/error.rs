//! Error types for the identity-verification handshake

use thiserror::Error;

use crate::store::StoreError;

/// Result type alias using HandshakeError
pub type Result<T> = std::result::Result<T, HandshakeError>;

/// Failure kinds of a handshake attempt
///
/// Every kind resolves to a terminal [`HandshakeOutcome`](crate::HandshakeOutcome)
/// with a retry affordance; see its `From<HandshakeError>` impl.
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// The backend could not mint a session
    #[error("Provider error: {0}")]
    Provider(String),

    /// The Bridge received an incomplete redirect
    #[error("Incomplete provider redirect: {0}")]
    Parse(String),

    /// The oracle explicitly rejected the payload
    #[error("Verification rejected: {0}")]
    VerificationRejected(String),

    /// No result arrived within the bound, or the session expired
    #[error("Timed out waiting for a verification result")]
    TimedOut,

    /// The oracle was unreachable
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// The child browsing context could not be opened
    #[error("Could not open verification context: {0}")]
    ContextOpen(String),

    /// The user cancelled the attempt
    #[error("Handshake cancelled")]
    Cancelled,

    /// `begin()` was called while an attempt is awaiting its result
    #[error("A handshake is already in progress")]
    AlreadyInProgress,

    /// The shared result store failed
    #[error("Result store error: {0}")]
    Store(#[from] StoreError),
}
