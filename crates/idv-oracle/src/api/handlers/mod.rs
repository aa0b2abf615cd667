//! API request handlers

pub mod sessions;

pub use sessions::{create_session, verify_session, AppState, OracleConfig, RequestDescriptor};
