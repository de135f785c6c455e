use super::build_models::BuildRecord;
use crate::core::store::StoreError;
use async_trait::async_trait;

#[async_trait]
pub trait BuildStore: Send + Sync {
    async fn get_builds(&self, guild_id: u64) -> Result<Vec<BuildRecord>, StoreError>;
    /// Replaces the guild's whole build list.
    async fn save_builds(&self, guild_id: u64, builds: &[BuildRecord]) -> Result<(), StoreError>;
}
