//! Error types for session operations

/// Errors from the token lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no authorization code received")]
    MissingCode,

    #[error("authorization code exchange failed: {0}")]
    AuthExchange(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("refresh token rejected: {0}")]
    RefreshRejected(String),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
