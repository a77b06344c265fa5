//! Errors surfaced by the crawl engine.

use common::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("resume state error: {0}")]
    Resume(#[from] common::Error),

    #[error(transparent)]
    Graphql(#[from] copima_graphql::Error),

    #[error(transparent)]
    Sink(#[from] copima_sink::Error),

    /// A phase exhausted its retry budget on a connectivity/server error.
    /// The phase's partial results are already flushed; this propagates to
    /// the caller per spec.
    #[error("phase {phase} partially failed: {failed_count} entities skipped")]
    PartiallyFailed { phase: String, failed_count: usize },

    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Stable taxonomy tag for this error, per the error-handling design.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Resume(e) => e.kind(),
            Error::Graphql(e) => e.kind(),
            Error::Sink(e) => e.kind(),
            Error::PartiallyFailed { .. } => ErrorKind::Connectivity,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
