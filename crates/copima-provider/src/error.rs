//! Errors surfaced by a `TokenSource`.

use common::ErrorKind;

/// Errors from obtaining or refreshing a bearer token.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown account: {0}")]
    NotFound(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Stable taxonomy tag for this error, per the error-handling design.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::AuthMissing,
            Error::RefreshFailed(_) => ErrorKind::RefreshFailed,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Result alias for token source operations.
pub type Result<T> = std::result::Result<T, Error>;
