use super::account_models::ApiKeyRecord;
use crate::core::gw2::GuildDetails;
use crate::core::store::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;

/// Keys are scoped by `(guild_id, user_id)` and named uniquely within that
/// scope (case-insensitive).
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn list_keys(&self, guild_id: u64, user_id: u64)
        -> Result<Vec<ApiKeyRecord>, StoreError>;

    async fn find_key(
        &self,
        guild_id: u64,
        user_id: u64,
        name: &str,
    ) -> Result<Option<ApiKeyRecord>, StoreError>;

    async fn upsert_key(
        &self,
        guild_id: u64,
        user_id: u64,
        record: &ApiKeyRecord,
    ) -> Result<(), StoreError>;

    /// Returns whether a key was deleted.
    async fn delete_key(&self, guild_id: u64, user_id: u64, name: &str)
        -> Result<bool, StoreError>;

    async fn upsert_guild_details(&self, details: &[GuildDetails]) -> Result<(), StoreError>;

    /// Cached "Name [TAG]" labels for the ids that are known.
    async fn guild_labels(&self, guild_ids: &[String])
        -> Result<HashMap<String, String>, StoreError>;
}
