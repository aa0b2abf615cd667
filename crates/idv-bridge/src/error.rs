//! Error types for the Bridge

use thiserror::Error;

/// Result type for Bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur while handling a provider redirect
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// One or more required redirect parameters were absent or empty
    #[error("Missing redirect parameters: {}", .0.join(", "))]
    MissingParameter(Vec<&'static str>),

    /// The redirect address could not be parsed at all
    #[error("Invalid redirect: {0}")]
    InvalidRedirect(String),
}

impl From<url::ParseError> for BridgeError {
    fn from(err: url::ParseError) -> Self {
        BridgeError::InvalidRedirect(err.to_string())
    }
}
