//! Error types for BMC operations

use thiserror::Error;

/// Error type for BMC operations
#[derive(Debug, Error)]
pub enum BmcError {
    /// BMC could not be reached
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// BMC rejected the credentials
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// BMC accepted the connection but the command failed
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// BMC replied with something we could not interpret
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Operation timed out
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Unsupported operation
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Requested account does not exist on the BMC
    #[error("user not found: {0}")]
    UserNotFound(String),
}

impl BmcError {
    /// Whether the failure happened before a BMC session was established
    pub fn is_connection(&self) -> bool {
        matches!(self, BmcError::ConnectionFailed(_) | BmcError::Timeout(_))
    }
}

impl From<reqwest::Error> for BmcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BmcError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            BmcError::ConnectionFailed(err.to_string())
        } else if err.is_decode() {
            BmcError::UnexpectedResponse(err.to_string())
        } else {
            BmcError::CommandFailed(err.to_string())
        }
    }
}

/// Result type for BMC operations
pub type Result<T> = std::result::Result<T, BmcError>;
