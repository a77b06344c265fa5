//! CLI-level error: wraps every crate-local error type behind the shared
//! `common::ErrorKind` taxonomy so the binary can print a uniform
//! `{kind}: {message}` line and pick an exit code (spec §6/§7) regardless
//! of which layer the failure originated in.

use common::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] copima_config::Error),

    #[error(transparent)]
    Credentials(#[from] copima_credentials::Error),

    #[error(transparent)]
    Token(#[from] copima_token::Error),

    #[error(transparent)]
    Graphql(#[from] copima_graphql::Error),

    #[error(transparent)]
    Sink(#[from] copima_sink::Error),

    #[error(transparent)]
    Crawl(#[from] copima_crawl::Error),

    #[error(transparent)]
    Common(#[from] common::Error),

    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Stable taxonomy tag, or `None` for a plain usage error (not part of
    /// the nine-member taxonomy — it never reaches an upstream dependency).
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Config(e) => Some(e.kind()),
            Error::Credentials(e) => Some(e.kind()),
            Error::Token(e) => Some(e.kind()),
            Error::Graphql(e) => Some(e.kind()),
            Error::Sink(e) => Some(e.kind()),
            Error::Crawl(e) => Some(e.kind()),
            Error::Common(e) => Some(e.kind()),
            Error::Usage(_) | Error::Other(_) => None,
        }
    }

    /// Process exit code per spec §6: 0 success, 1 any unrecovered
    /// failure, 2 reserved for configuration error.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            Some(ErrorKind::ConfigInvalid) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
