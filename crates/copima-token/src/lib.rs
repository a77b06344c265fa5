//! Token Manager: binds to the Credential Store and hands out valid bearer
//! tokens by account id, refreshing proactively ahead of expiry and
//! on-demand after an upstream rejection.
//!
//! Account lifecycle:
//! 1. `auth` persists an account via the Credential Store, status implicit (has a token)
//! 2. `TokenManager::get_access_token` returns the stored token, or refreshes first if it's stale
//! 3. A scheduled background refresh keeps the token ahead of `refresh_threshold` without request-time latency
//! 4. The GraphQL Client calls `force_refresh` after a 401 to force a refresh regardless of the threshold check
//! 5. `destroy()` cancels every outstanding scheduled refresh

pub mod error;
pub mod manager;

pub use error::{Error, Result};
pub use manager::TokenManager;
