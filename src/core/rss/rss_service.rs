use super::rss_models::{FeedPost, FeedSubscription};
use super::rss_store::RssStore;
use crate::core::audit::AuditRecord;
use crate::core::feeds::{Feed, FeedEntry, FeedFetcher, FetchError};
use crate::core::store::{GuildLocks, StoreError};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use thiserror::Error;
use tracing::{error, info, warn};

/// Upper bound on entries announced per feed per wake.
const MAX_ENTRIES_PER_WAKE: usize = 10;
const NAME_MAX_CHARS: usize = 100;
const AUTOCOMPLETE_LIMIT: usize = 25;

#[derive(Debug, Error)]
pub enum RssError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Fetch(#[from] FetchError),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
}

/// Baseline recorded after a fetch: the newest entry's identity.
struct Baseline {
    name: String,
    url: String,
    entry_id: String,
    published: Option<DateTime<Utc>>,
}

/// Polls RSS/Atom subscriptions and reports entries the guild has not seen.
///
/// Polling only produces `FeedPost`s; sending them is up to the Discord
/// layer. The stored position always advances to the newest fetched entry,
/// so a failed send is not retried on the next wake.
pub struct RssService<F: FeedFetcher, S: RssStore> {
    fetcher: F,
    store: S,
    locks: GuildLocks,
}

impl<F: FeedFetcher, S: RssStore> RssService<F, S> {
    pub fn new(fetcher: F, store: S) -> Self {
        Self {
            fetcher,
            store,
            locks: GuildLocks::new(),
        }
    }

    /// Create or update a subscription. The feed is fetched once to check it
    /// parses and to record the current newest entry, so existing history is
    /// never announced.
    pub async fn set_feed(
        &self,
        guild_id: u64,
        actor_id: u64,
        name: &str,
        url: &str,
        channel_id: u64,
    ) -> Result<(FeedSubscription, AuditRecord), RssError> {
        let name = name.trim();
        let url = url.trim();
        if name.is_empty() || name.chars().count() > NAME_MAX_CHARS {
            return Err(RssError::Validation(format!(
                "Feed name must be between 1 and {NAME_MAX_CHARS} characters."
            )));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(RssError::Validation(
                "Feed URL must start with http:// or https://.".to_string(),
            ));
        }

        let feed = self.fetcher.fetch(url).await?;
        let baseline = newest_entry(&feed);

        let _guard = self.locks.lock(guild_id).await;
        let mut feeds = self.store.get_feeds(guild_id).await?;
        let subscription = match feeds.iter_mut().find(|f| f.name.eq_ignore_ascii_case(name)) {
            Some(existing) => {
                existing.url = url.to_string();
                existing.channel_id = channel_id;
                if let Some((entry_id, published)) = baseline {
                    existing.last_entry_id = Some(entry_id);
                    existing.last_entry_published_at = published;
                }
                existing.clone()
            }
            None => {
                let (last_entry_id, last_entry_published_at) = match baseline {
                    Some((entry_id, published)) => (Some(entry_id), published),
                    None => (None, None),
                };
                let created = FeedSubscription {
                    name: name.to_string(),
                    url: url.to_string(),
                    channel_id,
                    last_entry_id,
                    last_entry_published_at,
                };
                feeds.push(created.clone());
                created
            }
        };
        self.store.save_feeds(guild_id, &feeds).await?;

        let audit = AuditRecord::new(
            "rss_change",
            format!(
                "RSS feed **{}** now posts {} in <#{}>",
                subscription.name, subscription.url, subscription.channel_id
            ),
        )
        .with_actor(actor_id);
        Ok((subscription, audit))
    }

    pub async fn delete_feed(
        &self,
        guild_id: u64,
        actor_id: u64,
        name: &str,
    ) -> Result<(FeedSubscription, AuditRecord), RssError> {
        let _guard = self.locks.lock(guild_id).await;
        let mut feeds = self.store.get_feeds(guild_id).await?;
        let index = feeds
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| feed_not_found(name))?;
        let removed = feeds.remove(index);
        self.store.save_feeds(guild_id, &feeds).await?;

        let audit = AuditRecord::new("rss_change", format!("Removed RSS feed **{}**", removed.name))
            .with_actor(actor_id);
        Ok((removed, audit))
    }

    /// Sorted by name.
    pub async fn list_feeds(&self, guild_id: u64) -> Result<Vec<FeedSubscription>, RssError> {
        let mut feeds = self.store.get_feeds(guild_id).await?;
        feeds.sort_by_key(|f| f.name.to_lowercase());
        Ok(feeds)
    }

    pub async fn search_feeds(&self, guild_id: u64, partial: &str) -> Result<Vec<String>, RssError> {
        let needle = partial.to_lowercase();
        Ok(self
            .list_feeds(guild_id)
            .await?
            .into_iter()
            .map(|f| f.name)
            .filter(|n| n.to_lowercase().contains(&needle))
            .take(AUTOCOMPLETE_LIMIT)
            .collect())
    }

    /// The feed's current newest entry, for a manual test post. Does not move
    /// the stored position.
    pub async fn latest_entry(&self, guild_id: u64, name: &str) -> Result<FeedPost, RssError> {
        let subscription = self
            .store
            .get_feeds(guild_id)
            .await?
            .into_iter()
            .find(|f| f.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| feed_not_found(name))?;

        let feed = self.fetcher.fetch(&subscription.url).await?;
        let entry = feed
            .entries
            .first()
            .cloned()
            .ok_or_else(|| RssError::NotFound("That feed has no entries right now.".to_string()))?;
        Ok(feed_post(guild_id, &subscription, &feed, entry))
    }

    /// One poll across the given guilds.
    pub async fn poll(&self, guild_ids: &[u64]) -> Vec<FeedPost> {
        let results = join_all(
            guild_ids
                .iter()
                .map(|&guild_id| async move { (guild_id, self.poll_guild(guild_id).await) }),
        )
        .await;

        let mut posts = Vec::new();
        for (guild_id, result) in results {
            match result {
                Ok(mut guild_posts) => posts.append(&mut guild_posts),
                Err(e) => error!(guild_id, error = %e, "RSS poll failed"),
            }
        }
        posts
    }

    async fn poll_guild(&self, guild_id: u64) -> Result<Vec<FeedPost>, RssError> {
        // Fetch without holding the guild lock; positions are merged back after.
        let feeds = self.store.get_feeds(guild_id).await?;
        let mut posts = Vec::new();
        let mut baselines = Vec::new();

        for subscription in &feeds {
            let feed = match self.fetcher.fetch(&subscription.url).await {
                Ok(feed) => feed,
                Err(e) => {
                    warn!(guild_id, feed = %subscription.name, error = %e, "Failed to fetch RSS feed");
                    continue;
                }
            };
            let Some((entry_id, published)) = newest_entry(&feed) else {
                continue;
            };

            if let Some(last) = subscription.last_entry_id.as_deref() {
                for entry in new_entries(&feed.entries, last) {
                    posts.push(feed_post(guild_id, subscription, &feed, entry));
                }
            }

            if subscription.last_entry_id.as_deref() != Some(entry_id.as_str()) {
                baselines.push(Baseline {
                    name: subscription.name.clone(),
                    url: subscription.url.clone(),
                    entry_id,
                    published,
                });
            }
        }

        if !baselines.is_empty() {
            let _guard = self.locks.lock(guild_id).await;
            let mut current = self.store.get_feeds(guild_id).await?;
            for baseline in baselines {
                // Skip feeds edited or removed while we were fetching.
                if let Some(target) = current
                    .iter_mut()
                    .find(|f| f.name == baseline.name && f.url == baseline.url)
                {
                    target.last_entry_id = Some(baseline.entry_id);
                    target.last_entry_published_at = baseline.published;
                }
            }
            self.store.save_feeds(guild_id, &current).await?;
        }

        if !posts.is_empty() {
            info!(guild_id, count = posts.len(), "New RSS entries");
        }
        Ok(posts)
    }
}

fn newest_entry(feed: &Feed) -> Option<(String, Option<DateTime<Utc>>)> {
    feed.entries
        .iter()
        .find_map(|e| e.entry_id().map(|id| (id, e.published)))
}

/// Entries ahead of `last_seen` in feed order, oldest first, capped.
/// If `last_seen` is no longer in the feed, the newest entries are taken.
fn new_entries(entries: &[FeedEntry], last_seen: &str) -> Vec<FeedEntry> {
    let mut fresh: Vec<FeedEntry> = Vec::new();
    for entry in entries {
        let Some(id) = entry.entry_id() else {
            continue;
        };
        if id == last_seen {
            break;
        }
        fresh.push(entry.clone());
    }
    fresh.truncate(MAX_ENTRIES_PER_WAKE);
    fresh.reverse();
    fresh
}

fn feed_post(guild_id: u64, subscription: &FeedSubscription, feed: &Feed, entry: FeedEntry) -> FeedPost {
    FeedPost {
        guild_id,
        channel_id: subscription.channel_id,
        feed_name: subscription.name.clone(),
        feed_url: subscription.url.clone(),
        feed_title: feed.title.clone(),
        feed_link: feed.link.clone(),
        feed_icon: feed.icon.clone(),
        entry,
    }
}

fn feed_not_found(name: &str) -> RssError {
    RssError::NotFound(format!("RSS feed **{}** was not found.", name.trim()))
}
