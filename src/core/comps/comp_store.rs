use super::comp_models::CompState;
use crate::core::store::StoreError;
use async_trait::async_trait;

#[async_trait]
pub trait CompStore: Send + Sync {
    /// Empty state when the guild has never stored compositions.
    async fn load_state(&self, guild_id: u64) -> Result<CompState, StoreError>;
    async fn save_state(&self, guild_id: u64, state: &CompState) -> Result<(), StoreError>;
}
