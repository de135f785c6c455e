use super::rss_models::FeedSubscription;
use crate::core::store::StoreError;
use async_trait::async_trait;

#[async_trait]
pub trait RssStore: Send + Sync {
    async fn get_feeds(&self, guild_id: u64) -> Result<Vec<FeedSubscription>, StoreError>;
    /// Replaces the guild's whole subscription list.
    async fn save_feeds(&self, guild_id: u64, feeds: &[FeedSubscription]) -> Result<(), StoreError>;
}
