//! Error types for token manager operations.

use common::ErrorKind;

/// Errors from token manager operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("account not found: {0}")]
    NotFound(String),

    #[error("account has no refresh token, cannot refresh: {0}")]
    NotRefreshable(String),

    #[error("no oauth2 provider config bound for account: {0}")]
    UnboundProvider(String),

    #[error("credential store error: {0}")]
    Credential(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
}

impl Error {
    /// Stable taxonomy tag for this error, per the error-handling design.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::AuthMissing,
            Error::NotRefreshable(_) => ErrorKind::AuthInvalid,
            Error::UnboundProvider(_) => ErrorKind::ConfigInvalid,
            Error::Credential(_) => ErrorKind::StateCorrupt,
            Error::RefreshFailed(_) => ErrorKind::RefreshFailed,
        }
    }
}

impl From<copima_credentials::Error> for Error {
    fn from(err: copima_credentials::Error) -> Self {
        match err {
            copima_credentials::Error::InvalidCredentials(msg) => Error::NotRefreshable(msg),
            other => Error::RefreshFailed(other.to_string()),
        }
    }
}

/// Result alias for token manager operations.
pub type Result<T> = std::result::Result<T, Error>;
