//! Errors surfaced by the GraphQL client.

use common::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 2xx response whose `errors` array was non-empty — the client never
    /// silently returns `data` alongside GraphQL errors.
    #[error("graphql errors: {0:?}")]
    GraphqlErrors(Vec<String>),

    /// 401 with no bound token source/refresh capability, or a second 401
    /// after the one permitted refresh retry.
    #[error("invalid or expired access token")]
    AuthInvalid,

    /// Connection refused, unreachable, DNS failure, or the 30s per-request
    /// deadline was exceeded. Distinct from `AuthInvalid` per spec.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    #[error("request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    /// A typed helper's expected `nodes`/`pageInfo` shape was absent.
    #[error("unexpected response shape for {operation}: {detail}")]
    UnexpectedShape { operation: String, detail: String },

    #[error("failed to refresh token: {0}")]
    RefreshFailed(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::GraphqlErrors(_) => ErrorKind::GraphqlErrors,
            Error::AuthInvalid => ErrorKind::AuthInvalid,
            Error::Connectivity(_) => ErrorKind::Connectivity,
            Error::Http { .. } => ErrorKind::Connectivity,
            Error::UnexpectedShape { .. } => ErrorKind::GraphqlErrors,
            Error::RefreshFailed(_) => ErrorKind::RefreshFailed,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
