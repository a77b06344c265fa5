//! Common error types

use thiserror::Error;

use crate::kind::ErrorKind;

/// Common error type, shared by primitives that don't warrant their own
/// crate-local enum (atomic file writes, path derivation helpers).
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state corrupt: {0}")]
    StateCorrupt(String),
}

impl Error {
    /// Stable taxonomy tag for this error, per the error-handling design.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::ConfigInvalid,
            Error::Io(_) => ErrorKind::SinkWrite,
            Error::Toml(_) => ErrorKind::ConfigInvalid,
            Error::Json(_) => ErrorKind::SinkWrite,
            Error::StateCorrupt(_) => ErrorKind::StateCorrupt,
        }
    }
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;
