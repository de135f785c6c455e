use super::update_notes_models::UpdateNotesStatus;
use crate::core::store::StoreError;
use async_trait::async_trait;

#[async_trait]
pub trait UpdateNotesStore: Send + Sync {
    /// `None` until the guild has seen the feed once.
    async fn get_status(&self, guild_id: u64) -> Result<Option<UpdateNotesStatus>, StoreError>;
    async fn save_status(&self, guild_id: u64, status: &UpdateNotesStatus) -> Result<(), StoreError>;
}
