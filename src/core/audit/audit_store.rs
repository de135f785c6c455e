use super::audit_models::{AuditRecord, Gw2AuditEvent};
use crate::core::store::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Append-only audit storage, partitioned by guild.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn add_discord_event(&self, guild_id: u64, record: &AuditRecord)
        -> Result<(), StoreError>;

    /// Newest first.
    async fn recent_discord_events(
        &self,
        guild_id: u64,
        limit: u32,
    ) -> Result<Vec<AuditRecord>, StoreError>;

    /// Matches `user_id` against actor/target ids, and `user_query` as a
    /// case-insensitive substring of actor/target names. Newest first.
    async fn query_discord_events(
        &self,
        guild_id: u64,
        user_id: Option<u64>,
        user_query: &str,
        limit: u32,
    ) -> Result<Vec<AuditRecord>, StoreError>;

    async fn add_gw2_event(&self, guild_id: u64, event: &Gw2AuditEvent) -> Result<(), StoreError>;

    async fn query_gw2_events(
        &self,
        guild_id: u64,
        user_query: &str,
        limit: u32,
    ) -> Result<Vec<Gw2AuditEvent>, StoreError>;

    async fn gw2_last_log_id(&self, guild_id: u64) -> Result<Option<u64>, StoreError>;

    async fn set_gw2_last_log_id(
        &self,
        guild_id: u64,
        log_id: Option<u64>,
        synced_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
