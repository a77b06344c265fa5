//! `copima crawl [areas|users|resources|repository|all]`
//!
//! Wires every subsystem from the library crates into one run: resolves
//! the token source (a bound OAuth2 account or a directly configured
//! static token), builds the GraphQL client, sink, resume state, rate
//! limiter, and drives the `CrawlEngine` through the requested phases.

use std::sync::Arc;
use std::time::Duration;

use copima_config::Config;
use copima_credentials::CredentialStore;
use copima_crawl::{CrawlEngine, Phase, PhaseReport, ResumeState};
use copima_graphql::GraphqlClient;
use copima_provider::{StaticTokenSource, TokenSource};
use copima_sink::HierarchicalSink;
use copima_token::TokenManager;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{Error, Result};

const DEFAULT_MAX_RETRIES: u32 = 3;

pub async fn run(config: &Config, phases: &[Phase], account_id_override: Option<&str>) -> Result<Vec<PhaseReport>> {
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.gitlab.timeout))
        .build()
        .map_err(|e| Error::Other(anyhow::anyhow!("failed to build HTTP client: {e}")))?;

    let (token_source, account_id): (Arc<dyn TokenSource>, String) = resolve_token_source(config, &http_client, account_id_override).await?;

    let client = Arc::new(GraphqlClient::new(http_client, config.gitlab.host.clone(), token_source, account_id.clone()));

    let sink = Arc::new(HierarchicalSink::new(
        config.output.root_dir.clone(),
        config.output.file_naming,
        config.output.pretty_print,
        config.output.compression,
    ));

    let resume_path = if config.resume.enabled {
        config.resume.state_file.clone().into()
    } else {
        std::env::temp_dir().join(format!("copima-resume-{}-{}.json", account_id, std::process::id()))
    };
    if !config.resume.enabled {
        let _ = tokio::fs::remove_file(&resume_path).await;
    }
    let resume = Arc::new(ResumeState::load(resume_path).await?);

    let rate_limiter = copima_crawl::TokenBucket::new(config.gitlab.rate_limit);

    let cancellation = CancellationToken::new();
    let cancel_on_signal = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, cancelling crawl");
            cancel_on_signal.cancel();
        }
    });

    let engine = Arc::new(CrawlEngine::new(
        client,
        sink,
        resume,
        rate_limiter,
        config.gitlab.max_concurrency,
        cancellation,
        config.gitlab.host.clone(),
        account_id,
        DEFAULT_MAX_RETRIES,
        Duration::from_secs(config.resume.auto_save_interval),
    ));

    let reports = engine.run(phases).await?;
    Ok(reports)
}

/// Prefer an explicitly bound OAuth2 account (refreshable, managed by the
/// `TokenManager`) over a directly configured static access token; fail
/// with `auth-missing` if neither is available (spec §4.2/§7).
async fn resolve_token_source(config: &Config, http_client: &reqwest::Client, account_id_override: Option<&str>) -> Result<(Arc<dyn TokenSource>, String)> {
    if let Some(account_id) = account_id_override {
        let store = Arc::new(CredentialStore::load(config.database.path.clone().into()).await?);
        store
            .find_account_by_account_id(account_id)
            .await
            .ok_or_else(|| copima_credentials::Error::NotFound(format!("no account bound with account id {account_id}")))?;

        let providers: std::collections::HashMap<String, copima_credentials::OAuth2ProviderConfig> = config.oauth2.providers.clone();
        let manager: Arc<dyn TokenSource> = Arc::new(TokenManager::new(store, providers, http_client.clone()));
        return Ok((manager, account_id.to_string()));
    }

    if let Some(token) = &config.gitlab.access_token {
        let source: Arc<dyn TokenSource> = Arc::new(StaticTokenSource::new(token.expose().clone()));
        return Ok((source, "static".to_string()));
    }

    Err(copima_credentials::Error::NotFound("no --account-id bound and no gitlab.accessToken configured".to_string()).into())
}
