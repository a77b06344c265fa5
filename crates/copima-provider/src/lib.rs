//! Token source abstraction for the GraphQL client
//!
//! Decouples the GraphQL client from how a bearer token is obtained. The
//! client never holds or mutates credential state itself; it asks a
//! `TokenSource` for a bearer token keyed by account id, the same way the
//! provider this is adapted from let a caller delegate authentication
//! strategy entirely to a collaborator.
//!
//! `copima-token`'s `TokenManager` is the only production implementation;
//! tests use `StaticTokenSource` to avoid spinning up a real token manager
//! for cases that don't exercise refresh behavior.

use std::future::Future;
use std::pin::Pin;

pub use error::{Error, Result};

mod error;

/// Obtains a valid bearer access token for a given account id.
///
/// Uses `Pin<Box<dyn Future>>` return types so the trait stays
/// dyn-compatible (`Arc<dyn TokenSource>`).
pub trait TokenSource: Send + Sync {
    /// Return a currently-valid access token for `account_id`, refreshing
    /// it first if it is within the refresh threshold of expiry (or
    /// already expired). Returns `Error::NotFound` if the account is
    /// unknown to the underlying store.
    fn get_bearer<'a>(
        &'a self,
        account_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

    /// Force a refresh regardless of the current expiry, used by the
    /// GraphQL client after an upstream 401 (the stored token was already
    /// rejected, so a threshold check would just return the same token).
    fn force_refresh<'a>(
        &'a self,
        account_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

/// A fixed-token source for tests and for any account configured with a
/// non-expiring static token (`accessTokenExpiresAt` absent).
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenSource for StaticTokenSource {
    fn get_bearer<'a>(
        &'a self,
        _account_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move { Ok(self.token.clone()) })
    }

    fn force_refresh<'a>(
        &'a self,
        _account_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move { Ok(self.token.clone()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_returns_fixed_token() {
        let source = StaticTokenSource::new("fixed-token");
        assert_eq!(source.get_bearer("acct-1").await.unwrap(), "fixed-token");
        assert_eq!(source.force_refresh("acct-1").await.unwrap(), "fixed-token");
    }
}
