//! OAuth2 refresh-token grant client.
//!
//! POSTs form-encoded `{grant_type, ..., client_id, client_secret}` to the
//! provider's token endpoint. Retries transient failures with exponential
//! backoff; a `400` carrying `invalid_grant` is treated as fatal and is not
//! retried.

use common::Secret;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::OAuth2ProviderConfig;

const DEFAULT_MAX_RETRIES: u32 = 3;

/// Response from the token endpoint for both the authorization-code
/// exchange and a refresh-token grant.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    /// Seconds until the access token expires (delta, not absolute). Absent
    /// means the access token should be treated as non-expiring.
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// Exchange an authorization code (plus PKCE verifier) for tokens. The
/// second step of the PKCE flow: the user has authorized in their browser
/// and we hold the code from the callback redirect.
pub async fn exchange_code(
    client: &reqwest::Client,
    provider: &OAuth2ProviderConfig,
    code: &str,
    verifier: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(&provider.token_url)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier),
            ("client_id", provider.client_id.as_str()),
            ("client_secret", provider.client_secret.expose().as_str()),
            ("redirect_uri", provider.redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    parse_token_response(response, "token exchange").await
}

/// Refresh an access token using a refresh token. Retries up to
/// `max_retries` (default 3) with `2^attempt * 1000ms` backoff. A `400`
/// response carrying `invalid_grant` in the body is fatal and short-circuits
/// the retry loop immediately.
pub async fn refresh_token(
    client: &reqwest::Client,
    provider: &OAuth2ProviderConfig,
    refresh: &Secret<String>,
    max_retries: Option<u32>,
) -> Result<TokenResponse> {
    let max_retries = max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
    let mut attempt = 0;

    loop {
        let result = refresh_once(client, provider, refresh).await;
        match result {
            Ok(response) => return Ok(response),
            Err(err) if is_fatal(&err) => return Err(err),
            Err(err) if attempt >= max_retries => return Err(err),
            Err(_) => {
                let delay_ms = 1000u64 * (1u64 << attempt);
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
        }
    }
}

async fn refresh_once(
    client: &reqwest::Client,
    provider: &OAuth2ProviderConfig,
    refresh: &Secret<String>,
) -> Result<TokenResponse> {
    let response = client
        .post(&provider.token_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh.expose().as_str()),
            ("client_id", provider.client_id.as_str()),
            ("client_secret", provider.client_secret.expose().as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    parse_token_response(response, "token refresh").await
}

async fn parse_token_response(response: reqwest::Response, context: &str) -> Result<TokenResponse> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 400 && body.contains("invalid_grant") {
            return Err(Error::InvalidCredentials(format!(
                "{context} rejected ({status}): {body}"
            )));
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "{context} rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "{context} returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid {context} response: {e}")))
}

/// Whether an error represents a permanent rejection that must not be retried.
fn is_fatal(err: &Error) -> bool {
    matches!(err, Error::InvalidCredentials(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OAuth2ProviderConfig {
        OAuth2ProviderConfig {
            provider_id: "gitlab".into(),
            client_id: "client-123".into(),
            client_secret: Secret::new("secret-abc".into()),
            authorization_url: "https://gitlab.example.com/oauth/authorize".into(),
            token_url: "https://gitlab.example.com/oauth/token".into(),
            redirect_uri: "http://localhost:3000/callback".into(),
            scopes: vec!["read_api".into()],
        }
    }

    #[test]
    fn token_response_deserializes() {
        let json = r#"{"access_token":"at_abc","refresh_token":"rt_def","expires_in":3600}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "at_abc");
        assert_eq!(token.refresh_token.as_deref(), Some("rt_def"));
        assert_eq!(token.expires_in, Some(3600));
    }

    #[test]
    fn token_response_without_expiry_is_non_expiring() {
        let json = r#"{"access_token":"at_abc"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.expires_in, None);
    }

    #[test]
    fn backoff_delays_match_spec() {
        // 2^attempt * 1000ms for attempt in [0, 1, 2] => 1000, 2000, 4000
        let delays: Vec<u64> = (0..3).map(|attempt| 1000u64 * (1u64 << attempt)).collect();
        assert_eq!(delays, vec![1000, 2000, 4000]);
    }

    #[test]
    fn invalid_grant_is_fatal() {
        let err = Error::InvalidCredentials("400 invalid_grant".into());
        assert!(is_fatal(&err));
    }

    #[test]
    fn connectivity_error_is_not_fatal() {
        let err = Error::Http("connection refused".into());
        assert!(!is_fatal(&err));
    }

    #[tokio::test]
    async fn refresh_rejects_unreachable_endpoint() {
        let client = reqwest::Client::new();
        let mut provider = provider();
        provider.token_url = "http://127.0.0.1:1/oauth/token".into();
        let result = refresh_token(&client, &provider, &Secret::new("rt".into()), Some(0)).await;
        assert!(result.is_err());
    }
}
