//! Credential store: a document file `{ users: [...], accounts: [...] }`
//! guarded by a single writer. All mutations persist before returning; a
//! corrupted file is treated as empty and logged at warn (never crashes).

use std::path::PathBuf;

use chrono::Utc;
use common::atomic::{read_json_lenient, write_atomic_json};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{Account, User};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    accounts: Vec<Account>,
}

/// Thread-safe credential document manager.
///
/// The `Mutex` serializes every mutation (and the persist that follows it);
/// readers take the lock briefly to clone what they need so request-time
/// reads never block on a slow disk write.
pub struct CredentialStore {
    path: PathBuf,
    state: Mutex<Document>,
}

impl CredentialStore {
    /// Load the store from `path`. A missing file starts cold with zero
    /// users/accounts; a corrupt file is renamed aside and treated the same
    /// way (the `state-corrupt` policy), logged at `warn`.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let document = read_json_lenient::<Document>(&path)
            .await
            .map_err(|e| Error::CredentialParse(e.to_string()))?
            .unwrap_or_default();

        info!(
            path = %path.display(),
            users = document.users.len(),
            accounts = document.accounts.len(),
            "loaded credential store"
        );

        Ok(Self {
            path,
            state: Mutex::new(document),
        })
    }

    async fn persist(&self, document: &Document) -> Result<()> {
        write_atomic_json(&self.path, document)
            .await
            .map_err(|e| Error::Io(e.to_string()))
    }

    // --- User operations ---

    pub async fn insert_user(&self, user: User) -> Result<()> {
        let mut doc = self.state.lock().await;
        if doc.users.iter().any(|u| u.id == user.id) {
            return Err(Error::DuplicateId(format!("user {} already exists", user.id)));
        }
        doc.users.push(user);
        self.persist(&doc).await
    }

    /// Insert or replace a user keyed by `email` (the upsert key per spec).
    pub async fn upsert_user(&self, user: User) -> Result<()> {
        let mut doc = self.state.lock().await;
        match doc.users.iter_mut().find(|u| u.email == user.email) {
            Some(existing) => {
                let mut updated = user;
                updated.created_at = existing.created_at;
                updated.updated_at = Utc::now();
                *existing = updated;
            }
            None => doc.users.push(user),
        }
        self.persist(&doc).await
    }

    pub async fn find_user_by_id(&self, id: &str) -> Option<User> {
        let doc = self.state.lock().await;
        doc.users.iter().find(|u| u.id == id).cloned()
    }

    pub async fn find_user_by_email(&self, email: &str) -> Option<User> {
        let doc = self.state.lock().await;
        doc.users.iter().find(|u| u.email == email).cloned()
    }

    /// Delete a user and cascade-delete every account whose `user_id`
    /// matches, in one locked critical section.
    pub async fn delete_user(&self, id: &str) -> Result<()> {
        let mut doc = self.state.lock().await;
        let before = doc.users.len();
        doc.users.retain(|u| u.id != id);
        if doc.users.len() == before {
            return Err(Error::NotFound(format!("user {id} not found")));
        }
        doc.accounts.retain(|a| a.user_id != id);
        debug!(user_id = id, "deleted user and cascaded accounts");
        self.persist(&doc).await
    }

    // --- Account operations ---

    pub async fn insert_account(&self, account: Account) -> Result<()> {
        let mut doc = self.state.lock().await;
        if doc.accounts.iter().any(|a| a.id == account.id) {
            return Err(Error::DuplicateId(format!(
                "account {} already exists",
                account.id
            )));
        }
        if !doc.users.iter().any(|u| u.id == account.user_id) {
            return Err(Error::DanglingUserId(account.user_id.clone()));
        }
        doc.accounts.push(account);
        self.persist(&doc).await
    }

    pub async fn find_account_by_account_id(&self, account_id: &str) -> Option<Account> {
        let doc = self.state.lock().await;
        doc.accounts
            .iter()
            .find(|a| a.account_id == account_id)
            .cloned()
    }

    pub async fn find_accounts_by_user_id(&self, user_id: &str) -> Vec<Account> {
        let doc = self.state.lock().await;
        doc.accounts
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Apply `patch` to the account identified by `account_id`, bumping
    /// `updated_at`. `patch` receives a mutable reference so callers can
    /// update only the fields a refresh touched.
    pub async fn update_account(
        &self,
        account_id: &str,
        patch: impl FnOnce(&mut Account),
    ) -> Result<Account> {
        let mut doc = self.state.lock().await;
        let account = doc
            .accounts
            .iter_mut()
            .find(|a| a.account_id == account_id)
            .ok_or_else(|| Error::NotFound(format!("account {account_id} not found")))?;
        patch(account);
        account.updated_at = Utc::now();
        let updated = account.clone();
        self.persist(&doc).await?;
        Ok(updated)
    }

    pub async fn delete_account(&self, account_id: &str) -> Result<Option<Account>> {
        let mut doc = self.state.lock().await;
        let before = doc.accounts.len();
        let removed = doc
            .accounts
            .iter()
            .find(|a| a.account_id == account_id)
            .cloned();
        doc.accounts.retain(|a| a.account_id != account_id);
        if doc.accounts.len() != before {
            self.persist(&doc).await?;
        }
        Ok(removed)
    }

    /// Inner join of accounts on their owning user, for admin listing.
    pub async fn accounts_with_users(&self) -> Vec<(Account, User)> {
        let doc = self.state.lock().await;
        doc.accounts
            .iter()
            .filter_map(|a| {
                doc.users
                    .iter()
                    .find(|u| u.id == a.user_id)
                    .map(|u| (a.clone(), u.clone()))
            })
            .collect()
    }

    pub async fn account_count(&self) -> usize {
        self.state.lock().await.accounts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;

    fn test_user(id: &str, email: &str) -> User {
        let now = Utc::now();
        User {
            id: id.into(),
            name: format!("user-{id}"),
            email: email.into(),
            email_verified: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn test_account(id: &str, account_id: &str, user_id: &str) -> Account {
        let now = Utc::now();
        Account {
            id: id.into(),
            account_id: account_id.into(),
            provider_id: crate::types::ProviderId::Gitlab,
            user_id: user_id.into(),
            access_token: Secret::new("at".into()),
            refresh_token: Some(Secret::new("rt".into())),
            access_token_expires_at: None,
            refresh_token_expires_at: None,
            scope: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = CredentialStore::load(path.clone()).await.unwrap();
        store.insert_user(test_user("u1", "a@example.com")).await.unwrap();
        store
            .insert_account(test_account("acc1", "gitlab:host:1", "u1"))
            .await
            .unwrap();

        let store2 = CredentialStore::load(path).await.unwrap();
        let account = store2
            .find_account_by_account_id("gitlab:host:1")
            .await
            .unwrap();
        assert_eq!(account.access_token.expose(), "at");
    }

    #[tokio::test]
    async fn cold_start_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = CredentialStore::load(path).await.unwrap();
        assert_eq!(store.account_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_user_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::load(dir.path().join("c.json")).await.unwrap();
        store.insert_user(test_user("u1", "a@example.com")).await.unwrap();
        let result = store.insert_user(test_user("u1", "b@example.com")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn account_with_unknown_user_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::load(dir.path().join("c.json")).await.unwrap();
        let result = store
            .insert_account(test_account("acc1", "gitlab:host:1", "ghost"))
            .await;
        assert!(matches!(result, Err(Error::DanglingUserId(_))));
    }

    #[tokio::test]
    async fn delete_user_cascades_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::load(dir.path().join("c.json")).await.unwrap();
        store.insert_user(test_user("u1", "a@example.com")).await.unwrap();
        store
            .insert_account(test_account("acc1", "gitlab:host:1", "u1"))
            .await
            .unwrap();

        store.delete_user("u1").await.unwrap();
        assert!(store.find_user_by_id("u1").await.is_none());
        assert!(
            store
                .find_account_by_account_id("gitlab:host:1")
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn update_account_bumps_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::load(dir.path().join("c.json")).await.unwrap();
        store.insert_user(test_user("u1", "a@example.com")).await.unwrap();
        let account = test_account("acc1", "gitlab:host:1", "u1");
        let original_updated_at = account.updated_at;
        store.insert_account(account).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let updated = store
            .update_account("gitlab:host:1", |a| {
                a.access_token = Secret::new("new-token".into());
            })
            .await
            .unwrap();

        assert_eq!(updated.access_token.expose(), "new-token");
        assert!(updated.updated_at > original_updated_at);
    }

    #[tokio::test]
    async fn upsert_user_replaces_on_email_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::load(dir.path().join("c.json")).await.unwrap();
        store.insert_user(test_user("u1", "a@example.com")).await.unwrap();

        let mut replacement = test_user("u2", "a@example.com");
        replacement.name = "renamed".into();
        store.upsert_user(replacement).await.unwrap();

        let user = store.find_user_by_email("a@example.com").await.unwrap();
        assert_eq!(user.name, "renamed");
        // Only one user should exist for this email after upsert.
        assert!(store.find_user_by_id("u1").await.is_some() || store.find_user_by_id("u2").await.is_some());
    }

    #[tokio::test]
    async fn corrupt_file_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = CredentialStore::load(path).await.unwrap();
        assert_eq!(store.account_count().await, 0);
    }

    #[tokio::test]
    async fn accounts_with_users_inner_joins() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::load(dir.path().join("c.json")).await.unwrap();
        store.insert_user(test_user("u1", "a@example.com")).await.unwrap();
        store
            .insert_account(test_account("acc1", "gitlab:host:1", "u1"))
            .await
            .unwrap();

        let joined = store.accounts_with_users().await;
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].1.email, "a@example.com");
    }
}
