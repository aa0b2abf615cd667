//! Development verification oracle
//!
//! A small axum service that plays the backend oracle for local runs and
//! tests: it mints verification sessions and judges the results the Bridge
//! relays back. Integrity tags are HMAC-SHA256 under a key shared with
//! whatever plays the provider (see [`seal_claims`]).
//!
//! ## API Endpoints
//!
//! - `GET /health` - Liveness check
//! - `GET /ready` - Readiness check with session count
//! - `POST /v1/sessions` - Mint a session for a return endpoint
//! - `POST /v1/sessions/verify` - Verify a submitted result (consumes the session;
//!   resubmitting the same result replays its verdict)

pub mod api;
pub mod core;
pub mod keys;
pub mod storage;

pub use api::create_router;
pub use api::handlers::{AppState, OracleConfig};
pub use crate::core::Rejection;
pub use keys::{seal_claims, IntegrityKey, KeyError, KeySource, SealedClaims};
pub use storage::{MemorySessionStore, SessionRecord, SessionStore, Settlement, StorageError};
