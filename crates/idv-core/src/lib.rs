//! # IDV Core
//!
//! Shared primitives for the third-party identity-verification handshake.
//!
//! ## Contexts
//!
//! - **Initiator**: mints a session with the backend and opens the provider
//!   in a separate browsing context
//! - **Bridge**: the page the provider redirects to; publishes the result
//! - **Finalizer**: consumes a result exactly once and submits it to the oracle
//!
//! The contexts share no memory. A result crosses the boundary over two
//! independent channels:
//!
//! 1. **[`SharedResultStore`]**: durable, polled, single key, read-clears
//! 2. **[`CrossContextChannel`]**: push, fast, may be blocked or stale
//!
//! Consumption is idempotent on the result value, so the protocol does not
//! care which channel lands first.

pub mod channel;
pub mod clock;
pub mod error;
pub mod store;
pub mod types;
pub mod wire;

pub use channel::{ChannelError, ChannelListener, CrossContextChannel, Envelope, OpenerHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{HandshakeError, Result};
pub use store::{FileStorage, MemoryStorage, ProfileStorage, SharedResultStore, StoreError, RESULT_KEY};
pub use types::{
    Attribution, DeliveryPath, EpochMillis, ErrorResult, HandshakeOutcome, RejectReason, RenderedOutcome,
    ResultMessage, SessionToken, UserClaims, VerificationResult, VerificationSession,
};
pub use wire::{CreateSessionRequest, SessionGrant, VerifyRequest, VerifyResponse};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
