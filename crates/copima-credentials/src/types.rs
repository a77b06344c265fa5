//! Data model for the credential store: users, OAuth2 accounts, and the
//! static per-provider OAuth2 configuration that accounts are issued against.

use chrono::{DateTime, Utc};
use common::Secret;
use serde::{Deserialize, Serialize};

/// A registered operator or service identity. Uniqueness key is `email`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One OAuth2-authenticated account bound to a `User`.
///
/// `account_id` is the provider-facing identifier (e.g. `gitlab:host:42`)
/// and is globally unique within the store; `id` is the store's own
/// internal key. They're kept distinct because `find_account_by_account_id`
/// and `find_accounts_by_user_id` index on different keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub account_id: String,
    pub provider_id: ProviderId,
    pub user_id: String,
    pub access_token: Secret<String>,
    /// Absent means the token cannot be auto-refreshed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<Secret<String>>,
    /// Absent means the access token is treated as non-expiring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Whether this account's access token can ever be auto-refreshed.
    pub fn is_refreshable(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Whether the access token has an expiry at all.
    pub fn is_expiring(&self) -> bool {
        self.access_token_expires_at.is_some()
    }
}

/// Identifies which GraphQL-compatible provider issued an account's tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Gitlab,
    Github,
    Custom,
}

impl ProviderId {
    /// Lowercase tag matching the key an account's issuing provider is
    /// registered under in `oauth2.providers`.
    pub fn tag(self) -> &'static str {
        match self {
            ProviderId::Gitlab => "gitlab",
            ProviderId::Github => "github",
            ProviderId::Custom => "custom",
        }
    }
}

/// Static OAuth2 client configuration for one named provider entry under
/// `config.oauth2.providers`. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2ProviderConfig {
    /// Key this config is registered under in `oauth2.providers`, also
    /// matched against `Account.provider_id` to find the config that issued
    /// a given account's tokens.
    pub provider_id: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub authorization_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}
