use super::config_models::GuildConfig;
use async_trait::async_trait;

pub use crate::core::store::StoreError;

#[async_trait]
pub trait GuildConfigStore: Send + Sync {
    /// Missing configuration yields `GuildConfig::default()`.
    async fn get_config(&self, guild_id: u64) -> Result<GuildConfig, StoreError>;
    async fn save_config(&self, guild_id: u64, config: &GuildConfig) -> Result<(), StoreError>;
}
