//! Error types for sink operations.

use common::ErrorKind;

/// Errors from writing to the hierarchical JSONL sink.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl Error {
    /// Stable taxonomy tag for this error, per the error-handling design.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io { .. } => ErrorKind::SinkWrite,
            Error::Serialize(_) => ErrorKind::SinkWrite,
        }
    }
}

/// Result alias for sink operations.
pub type Result<T> = std::result::Result<T, Error>;
