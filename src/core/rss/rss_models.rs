use crate::core::feeds::FeedEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSubscription {
    /// Unique per guild, ignoring case.
    pub name: String,
    pub url: String,
    pub channel_id: u64,
    /// Identity of the newest entry seen on the last successful fetch.
    #[serde(default)]
    pub last_entry_id: Option<String>,
    #[serde(default)]
    pub last_entry_published_at: Option<DateTime<Utc>>,
}

/// One entry to announce, with the routing and feed branding the Discord
/// layer needs to build the embed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPost {
    pub guild_id: u64,
    pub channel_id: u64,
    pub feed_name: String,
    pub feed_url: String,
    pub feed_title: Option<String>,
    pub feed_link: Option<String>,
    pub feed_icon: Option<String>,
    pub entry: FeedEntry,
}
