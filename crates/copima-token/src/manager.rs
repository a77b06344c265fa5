//! Token Manager: returns a valid access token for an account id,
//! transparently refreshing when within a threshold of expiry, serializing
//! concurrent refreshes per account.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use copima_credentials::{Account, CredentialStore, OAuth2ProviderConfig};
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(300);

/// Returns bearer tokens for account ids, refreshing proactively and
/// on-demand. Holds at most one refresh attempt in flight per account; all
/// concurrent callers observe its result.
pub struct TokenManager {
    store: Arc<CredentialStore>,
    providers: HashMap<String, OAuth2ProviderConfig>,
    http_client: reqwest::Client,
    refresh_threshold: Duration,
    /// Per-account lock guarding a refresh attempt. A caller who finds the
    /// lock already held waits on it, then re-checks the (now-updated)
    /// account instead of issuing its own request — the single-flight
    /// property.
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    timers: Mutex<HashMap<String, AbortHandle>>,
}

impl TokenManager {
    pub fn new(
        store: Arc<CredentialStore>,
        providers: HashMap<String, OAuth2ProviderConfig>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            store,
            providers,
            http_client,
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            in_flight: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    /// Return a currently-valid access token for `account_id`, refreshing
    /// first if the stored token is within `refresh_threshold` of expiry (or
    /// already expired). Returns `None` only if the account is missing
    /// (spec: `getAccessToken` returns `token | null`).
    pub async fn get_access_token(&self, account_id: &str) -> Result<Option<String>> {
        let account = match self.store.find_account_by_account_id(account_id).await {
            Some(a) => a,
            None => return Ok(None),
        };

        if !self.needs_refresh(&account) {
            return Ok(Some(account.access_token.expose().clone()));
        }

        let refreshed = self.refresh_single_flight(account_id).await?;
        Ok(Some(refreshed.access_token.expose().clone()))
    }

    /// Force a refresh regardless of current expiry (used after an upstream
    /// 401: the stored token already failed, so a threshold check would
    /// just return the same rejected token).
    pub async fn force_refresh(&self, account_id: &str) -> Result<String> {
        let account = self.refresh_single_flight(account_id).await?;
        Ok(account.access_token.expose().clone())
    }

    fn needs_refresh(&self, account: &Account) -> bool {
        let Some(expires_at) = account.access_token_expires_at else {
            return false;
        };
        let threshold = chrono::Duration::from_std(self.refresh_threshold).unwrap_or_default();
        Utc::now() + threshold >= expires_at
    }

    async fn lock_for(&self, account_id: &str) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        in_flight
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Perform (or wait for) the one in-flight refresh for `account_id`.
    async fn refresh_single_flight(&self, account_id: &str) -> Result<Account> {
        let lock = self.lock_for(account_id).await;
        let _guard = lock.lock().await;

        // Re-read: another caller may have just refreshed while we waited
        // for the lock above.
        let account = self
            .store
            .find_account_by_account_id(account_id)
            .await
            .ok_or_else(|| Error::NotFound(account_id.to_string()))?;
        if !self.needs_refresh(&account) {
            return Ok(account);
        }

        let refresh_token = account
            .refresh_token
            .as_ref()
            .ok_or_else(|| Error::NotRefreshable(account_id.to_string()))?;
        let provider = self
            .providers
            .get(account.provider_id.tag())
            .ok_or_else(|| Error::UnboundProvider(account_id.to_string()))?;

        let response = copima_credentials::refresh_token(
            &self.http_client,
            provider,
            refresh_token,
            None,
        )
        .await?;

        let expires_at = response
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs as i64));
        let new_refresh_token = response.refresh_token.clone();
        let new_access_token = response.access_token.clone();

        let updated = self
            .store
            .update_account(account_id, move |a| {
                a.access_token = common::Secret::new(new_access_token);
                if let Some(rt) = new_refresh_token {
                    a.refresh_token = Some(common::Secret::new(rt));
                }
                a.access_token_expires_at = expires_at;
            })
            .await
            .map_err(|e| Error::Credential(e.to_string()))?;

        info!(account_id, "token refreshed");
        Ok(updated)
    }

    /// Schedule a cooperative background refresh. `delay =
    /// expires_in.saturating_sub(refresh_threshold)`; a non-positive delay
    /// declines to schedule (spec: "if non-positive, declines to schedule").
    /// The scheduled task reschedules itself from the new `expires_in` it
    /// observes after refreshing, so one call is enough to keep an
    /// account's token fresh indefinitely.
    pub fn schedule_token_refresh(self: &Arc<Self>, account_id: String, expires_in_secs: u64) {
        let threshold_secs = self.refresh_threshold.as_secs();
        let delay_secs = expires_in_secs.saturating_sub(threshold_secs);
        if delay_secs == 0 {
            return;
        }

        let manager = Arc::clone(self);
        let id_for_task = account_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            match manager.refresh_single_flight(&id_for_task).await {
                Ok(account) => {
                    debug!(account_id = %id_for_task, "scheduled refresh succeeded");
                    if let Some(expires_at) = account.access_token_expires_at {
                        let remaining = (expires_at - Utc::now()).num_seconds().max(0) as u64;
                        manager.schedule_token_refresh(id_for_task.clone(), remaining);
                    }
                }
                Err(e) => warn!(account_id = %id_for_task, error = %e, "scheduled refresh failed"),
            }
        });

        self.insert_timer(account_id, handle.abort_handle());
    }

    fn insert_timer(&self, account_id: String, handle: AbortHandle) {
        // Best-effort: a task spawn never blocks, so a blocking_lock-style
        // wait here would be unusual; use try_lock with a fallback spawn.
        if let Ok(mut timers) = self.timers.try_lock() {
            if let Some(old) = timers.insert(account_id, handle) {
                old.abort();
            }
        }
    }

    /// Cancel the scheduled timer for `account_id`, if any.
    pub async fn clear_token_refresh_timer(&self, account_id: &str) {
        if let Some(handle) = self.timers.lock().await.remove(account_id) {
            handle.abort();
        }
    }

    /// Cancel every scheduled timer. Idempotent.
    pub async fn destroy(&self) {
        let mut timers = self.timers.lock().await;
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }
}

impl copima_provider::TokenSource for TokenManager {
    fn get_bearer<'a>(
        &'a self,
        account_id: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = copima_provider::Result<String>> + Send + 'a>,
    > {
        Box::pin(async move {
            self.get_access_token(account_id)
                .await
                .map_err(|e| copima_provider::Error::RefreshFailed(e.to_string()))?
                .ok_or_else(|| copima_provider::Error::NotFound(account_id.to_string()))
        })
    }

    fn force_refresh<'a>(
        &'a self,
        account_id: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = copima_provider::Result<String>> + Send + 'a>,
    > {
        Box::pin(async move {
            TokenManager::force_refresh(self, account_id)
                .await
                .map_err(|e| copima_provider::Error::RefreshFailed(e.to_string()))
        })
    }
}
