// API key management: validate a key against the GW2 API, remember which
// account and guilds it belongs to, and cache guild names for display.

use super::account_models::{unique_key_name, ApiKeyRecord, KeySummary};
use super::account_store::ApiKeyStore;
use crate::core::gw2::{GuildDetails, Gw2Api, Gw2ApiError};
use crate::core::store::StoreError;
use chrono::Utc;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Fetch(#[from] Gw2ApiError),
    #[error("{0}")]
    Validation(String),
    #[error("No stored key named `{0}`. Use /apikey list to see saved keys.")]
    NotFound(String),
    #[error("You have already saved this API key.")]
    Duplicate,
}

pub struct AccountService<C: Gw2Api, S: ApiKeyStore> {
    client: C,
    store: S,
}

impl<C, S> AccountService<C, S>
where
    C: Gw2Api,
    S: ApiKeyStore,
{
    pub fn new(client: C, store: S) -> Self {
        Self { client, store }
    }

    pub async fn add_key(
        &self,
        guild_id: u64,
        user_id: u64,
        key: &str,
        name: Option<&str>,
    ) -> Result<KeySummary, AccountError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AccountError::Validation("Please provide an API key.".to_string()));
        }

        let existing = self.store.list_keys(guild_id, user_id).await?;
        if existing.iter().any(|record| record.key == key) {
            return Err(AccountError::Duplicate);
        }

        let (permissions, account_name, guild_ids, labels) = self.validate(key).await?;

        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(requested) => {
                if existing
                    .iter()
                    .any(|r| r.name.eq_ignore_ascii_case(requested))
                {
                    return Err(AccountError::Validation(format!(
                        "A key named `{requested}` already exists."
                    )));
                }
                requested.to_string()
            }
            None => unique_key_name(&account_name, &existing),
        };

        let now = Utc::now();
        let record = ApiKeyRecord {
            name,
            key: key.to_string(),
            account_name,
            permissions,
            guild_ids,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_key(guild_id, user_id, &record).await?;

        tracing::info!(guild_id, user_id, key_name = %record.name, "Stored GW2 API key");
        Ok(KeySummary::from_record(record, &labels))
    }

    /// Re-validate a stored key and update its account and guild data.
    pub async fn refresh_key(
        &self,
        guild_id: u64,
        user_id: u64,
        name: &str,
    ) -> Result<KeySummary, AccountError> {
        let mut record = self.require(guild_id, user_id, name).await?;
        let (permissions, account_name, guild_ids, labels) = self.validate(&record.key).await?;

        record.permissions = permissions;
        record.account_name = account_name;
        record.guild_ids = guild_ids;
        record.updated_at = Utc::now();
        self.store.upsert_key(guild_id, user_id, &record).await?;

        Ok(KeySummary::from_record(record, &labels))
    }

    pub async fn remove_key(
        &self,
        guild_id: u64,
        user_id: u64,
        name: &str,
    ) -> Result<ApiKeyRecord, AccountError> {
        let record = self.require(guild_id, user_id, name).await?;
        self.store.delete_key(guild_id, user_id, &record.name).await?;
        Ok(record)
    }

    pub async fn list_keys(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Vec<KeySummary>, AccountError> {
        let records = self.store.list_keys(guild_id, user_id).await?;
        let mut ids: Vec<String> = records
            .iter()
            .flat_map(|r| r.guild_ids.iter().cloned())
            .collect();
        ids.sort();
        ids.dedup();
        let labels = self.store.guild_labels(&ids).await?;

        Ok(records
            .into_iter()
            .map(|record| KeySummary::from_record(record, &labels))
            .collect())
    }

    async fn require(
        &self,
        guild_id: u64,
        user_id: u64,
        name: &str,
    ) -> Result<ApiKeyRecord, AccountError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AccountError::Validation(
                "Please provide the name of the key.".to_string(),
            ));
        }
        self.store
            .find_key(guild_id, user_id, name)
            .await?
            .ok_or_else(|| AccountError::NotFound(name.to_string()))
    }

    /// tokeninfo -> account -> guild details. Guild lookups that fail are
    /// skipped; the id is shown instead of a name.
    async fn validate(
        &self,
        key: &str,
    ) -> Result<(Vec<String>, String, Vec<String>, HashMap<String, String>), AccountError> {
        let token = self.client.token_info(key).await?;
        let mut permissions: Vec<String> = token
            .permissions
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        permissions.sort();
        permissions.dedup();

        let account = self.client.account(key).await?;
        let mut guild_ids: Vec<String> = account
            .guilds
            .iter()
            .map(|id| id.trim().to_lowercase())
            .filter(|id| !id.is_empty())
            .collect();
        guild_ids.sort();
        guild_ids.dedup();

        let mut details: Vec<GuildDetails> = Vec::new();
        for guild_id in &guild_ids {
            match self.client.guild_details(guild_id, Some(key)).await {
                Ok(found) => details.push(found),
                Err(err) => tracing::debug!(gw2_guild_id = %guild_id, "Guild lookup failed: {err}"),
            }
        }
        if !details.is_empty() {
            self.store.upsert_guild_details(&details).await?;
        }
        let labels = details
            .iter()
            .map(|d| (d.id.to_lowercase(), d.label()))
            .collect();

        Ok((permissions, account.name, guild_ids, labels))
    }
}
