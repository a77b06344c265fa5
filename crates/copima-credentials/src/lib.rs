//! GitLab-compatible OAuth2 credential storage and refresh-grant client.
//!
//! Standalone library with no dependency on the crawler binary — it can be
//! tested and used independently.
//!
//! Credential flow:
//! 1. `pkce::generate_verifier()` + `pkce::compute_challenge()` + `pkce::generate_state()`
//! 2. User authorizes via `pkce::build_authorization_url()`
//! 3. The `auth` command calls `refresh::exchange_code()` with the authorization code
//! 4. Account stored via `store::CredentialStore::insert_account()`
//! 5. The Token Manager calls `refresh::refresh_token()` proactively
//! 6. Updated tokens saved via `store::CredentialStore::update_account()`

pub mod error;
pub mod pkce;
pub mod refresh;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use pkce::{build_authorization_url, compute_challenge, generate_state, generate_verifier};
pub use refresh::{TokenResponse, exchange_code, refresh_token};
pub use store::CredentialStore;
pub use types::{Account, OAuth2ProviderConfig, ProviderId, User};
