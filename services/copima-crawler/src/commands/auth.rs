//! `copima auth [provider]`
//!
//! The browser-based authorization-code flow itself is out of scope (spec
//! §1) — this only builds the protocol boundary: generate PKCE state,
//! print the authorization URL for the operator to open, run a short-lived
//! local HTTP server for the `code`/`state` redirect, exchange the code,
//! and persist the resulting account.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use copima_config::Config;
use copima_credentials::{Account, CredentialStore, ProviderId, User, build_authorization_url, compute_challenge, exchange_code, generate_state, generate_verifier};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

struct CallbackState {
    expected_state: String,
    tx: tokio::sync::Mutex<Option<oneshot::Sender<Result<String>>>>,
}

pub async fn run(config: &Config, provider_name: &str) -> Result<()> {
    let provider = config
        .oauth2
        .providers
        .get(provider_name)
        .ok_or_else(|| Error::Usage(format!("no oauth2 provider named {provider_name:?} configured")))?
        .clone();

    let server_config = config.oauth2.server.clone().unwrap_or(copima_config::Oauth2ServerConfig {
        port: 3000,
        callback_path: "/callback".to_string(),
        timeout: 300,
    });

    let verifier = generate_verifier();
    let state = generate_state();
    let challenge = compute_challenge(&verifier);
    let authorization_url = build_authorization_url(&provider, &state, &challenge);

    println!("Open this URL in your browser to authorize copima:\n\n  {authorization_url}\n");

    let (tx, rx) = oneshot::channel();
    let callback_state = Arc::new(CallbackState {
        expected_state: state.clone(),
        tx: tokio::sync::Mutex::new(Some(tx)),
    });

    let app = Router::new().route(&server_config.callback_path, get(callback_handler)).with_state(callback_state);

    let listener = TcpListener::bind(("127.0.0.1", server_config.port))
        .await
        .map_err(|e| Error::Other(anyhow::anyhow!("failed to bind oauth2 callback listener on port {}: {e}", server_config.port)))?;

    let server_handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let code = match tokio::time::timeout(Duration::from_secs(server_config.timeout), rx).await {
        Ok(Ok(result)) => result?,
        Ok(Err(_)) => return Err(Error::Other(anyhow::anyhow!("callback channel closed before a redirect arrived"))),
        Err(_) => return Err(Error::Other(anyhow::anyhow!("timed out after {}s waiting for the oauth2 redirect", server_config.timeout))),
    };
    server_handle.abort();

    let http_client = reqwest::Client::new();
    let token_response = exchange_code(&http_client, &provider, &code, &verifier).await?;

    let store = CredentialStore::load(config.database.path.clone().into()).await?;
    let now = chrono::Utc::now();
    let email = format!("{provider_name}@{}", host_label(&config.gitlab.host));
    let user = match store.find_user_by_email(&email).await {
        Some(existing) => existing,
        None => {
            let user = User {
                id: uuid::Uuid::new_v4().to_string(),
                name: email.clone(),
                email: email.clone(),
                email_verified: false,
                created_at: now,
                updated_at: now,
            };
            store.upsert_user(user.clone()).await?;
            user
        }
    };

    let account_id = format!("{provider_name}:{}", host_label(&config.gitlab.host));
    let access_token_expires_at = token_response.expires_in.map(|secs| now + chrono::Duration::seconds(secs as i64));
    let account = Account {
        id: uuid::Uuid::new_v4().to_string(),
        account_id: account_id.clone(),
        provider_id: provider_id_for(provider_name),
        user_id: user.id.clone(),
        access_token: common::Secret::new(token_response.access_token.clone()),
        refresh_token: token_response.refresh_token.clone().map(common::Secret::new),
        access_token_expires_at,
        refresh_token_expires_at: None,
        scope: token_response.scope.clone(),
        created_at: now,
        updated_at: now,
    };
    store.insert_account(account).await?;

    info!(account_id, "account persisted");

    if let Some(expires_in) = token_response.expires_in {
        let store = Arc::new(store);
        let manager = Arc::new(copima_token::TokenManager::new(store, config.oauth2.providers.clone(), reqwest::Client::new()));
        manager.schedule_token_refresh(account_id.clone(), expires_in);
    }

    println!("Authenticated. Account id: {account_id}");
    println!("Use `--account-id {account_id}` with `copima crawl` to use it.");

    Ok(())
}

async fn callback_handler(State(state): State<Arc<CallbackState>>, Query(params): Query<CallbackParams>) -> Html<&'static str> {
    let result = match params {
        CallbackParams { error: Some(e), .. } => Err(Error::Usage(format!("authorization server returned an error: {e}"))),
        CallbackParams { code: Some(code), state: Some(received_state), .. } => {
            if received_state == state.expected_state {
                Ok(code)
            } else {
                Err(Error::Usage("state parameter mismatch; possible CSRF, aborting".to_string()))
            }
        }
        _ => Err(Error::Usage("callback missing code or state".to_string())),
    };

    if let Some(tx) = state.tx.lock().await.take() {
        let _ = tx.send(result);
    }

    Html("<html><body>Authentication complete. You may close this window.</body></html>")
}

fn provider_id_for(name: &str) -> ProviderId {
    match name {
        "gitlab" => ProviderId::Gitlab,
        "github" => ProviderId::Github,
        _ => ProviderId::Custom,
    }
}

fn host_label(host: &str) -> String {
    host.trim_start_matches("https://").trim_start_matches("http://").trim_end_matches('/').to_string()
}
