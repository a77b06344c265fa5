//! Error types for credential storage and OAuth2 refresh operations.

use common::ErrorKind;

/// Errors from credential store and OAuth2 refresh operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// The refresh grant was rejected outright (e.g. `invalid_grant`) — not
    /// worth retrying.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("credential store parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate id: {0}")]
    DuplicateId(String),

    #[error("referenced user does not exist: {0}")]
    DanglingUserId(String),
}

impl Error {
    /// Stable taxonomy tag for this error, per the error-handling design.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Http(_) => ErrorKind::Connectivity,
            Error::TokenExchange(_) => ErrorKind::RefreshFailed,
            Error::InvalidCredentials(_) => ErrorKind::AuthInvalid,
            Error::CredentialParse(_) => ErrorKind::StateCorrupt,
            Error::Io(_) => ErrorKind::SinkWrite,
            Error::NotFound(_) => ErrorKind::AuthMissing,
            Error::DuplicateId(_) => ErrorKind::ConfigInvalid,
            Error::DanglingUserId(_) => ErrorKind::ConfigInvalid,
        }
    }
}

/// Result alias for credential/refresh operations.
pub type Result<T> = std::result::Result<T, Error>;
