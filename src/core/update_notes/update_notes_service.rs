use super::update_notes_models::{PatchNotesEntry, UpdateNotesPost, UpdateNotesStatus, GAME_UPDATE_NOTES_FEED_URL};
use super::update_notes_store::UpdateNotesStore;
use crate::core::feeds::{FeedFetcher, FetchError};
use crate::core::store::{GuildLocks, StoreError};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum UpdateNotesError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Fetch(#[from] FetchError),
    #[error("No game update notes were found in the forum feed.")]
    NoEntries,
}

/// Watches the official game update notes feed on behalf of every guild that
/// configured an update notes channel. The feed is fetched once per wake.
pub struct UpdateNotesService<F: FeedFetcher, S: UpdateNotesStore> {
    fetcher: F,
    store: S,
    locks: GuildLocks,
}

impl<F: FeedFetcher, S: UpdateNotesStore> UpdateNotesService<F, S> {
    pub fn new(fetcher: F, store: S) -> Self {
        Self {
            fetcher,
            store,
            locks: GuildLocks::new(),
        }
    }

    /// Newest first, update notes only.
    pub async fn fetch_entries(&self) -> Result<Vec<PatchNotesEntry>, FetchError> {
        let feed = self.fetcher.fetch(GAME_UPDATE_NOTES_FEED_URL).await?;
        Ok(feed
            .entries
            .iter()
            .filter_map(PatchNotesEntry::from_feed_entry)
            .collect())
    }

    /// `targets` pairs each guild with its update notes channel. A guild
    /// seeing the feed for the first time only records the newest entry.
    pub async fn poll(&self, targets: &[(u64, u64)]) -> Vec<UpdateNotesPost> {
        if targets.is_empty() {
            return Vec::new();
        }
        let entries = match self.fetch_entries().await {
            Ok(entries) if !entries.is_empty() => entries,
            Ok(_) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to fetch game update notes feed");
                return Vec::new();
            }
        };

        let mut posts = Vec::new();
        for &(guild_id, channel_id) in targets {
            match self.poll_guild(guild_id, channel_id, &entries).await {
                Ok(mut guild_posts) => posts.append(&mut guild_posts),
                Err(e) => error!(guild_id, error = %e, "Update notes poll failed"),
            }
        }
        posts
    }

    async fn poll_guild(
        &self,
        guild_id: u64,
        channel_id: u64,
        entries: &[PatchNotesEntry],
    ) -> Result<Vec<UpdateNotesPost>, UpdateNotesError> {
        let Some(newest) = entries.first() else {
            return Ok(Vec::new());
        };

        let _guard = self.locks.lock(guild_id).await;
        let status = self.store.get_status(guild_id).await?;
        let Some(status) = status.filter(|s| s.last_entry_id.is_some()) else {
            self.store.save_status(guild_id, &status_for(newest)).await?;
            info!(guild_id, entry_id = %newest.entry_id, "Recorded update notes baseline");
            return Ok(Vec::new());
        };

        let fresh = new_entries(entries, &status);
        let Some(latest) = fresh.last() else {
            return Ok(Vec::new());
        };
        self.store.save_status(guild_id, &status_for(latest)).await?;

        Ok(fresh
            .into_iter()
            .map(|entry| UpdateNotesPost {
                guild_id,
                channel_id,
                entry,
            })
            .collect())
    }

    /// Re-announce the newest entry regardless of the stored status, and
    /// move the status to it.
    pub async fn force_latest(&self, guild_id: u64, channel_id: u64) -> Result<UpdateNotesPost, UpdateNotesError> {
        let entry = self
            .fetch_entries()
            .await?
            .into_iter()
            .next()
            .ok_or(UpdateNotesError::NoEntries)?;

        let _guard = self.locks.lock(guild_id).await;
        self.store.save_status(guild_id, &status_for(&entry)).await?;
        Ok(UpdateNotesPost {
            guild_id,
            channel_id,
            entry,
        })
    }
}

fn status_for(entry: &PatchNotesEntry) -> UpdateNotesStatus {
    UpdateNotesStatus {
        last_entry_id: Some(entry.entry_id.clone()),
        last_entry_published_at: entry.published_at,
    }
}

/// Entries newer than the stored status, oldest first. The scan stops at the
/// stored entry (by any of its identities) or at anything published at or
/// before the stored publish time.
fn new_entries(entries: &[PatchNotesEntry], status: &UpdateNotesStatus) -> Vec<PatchNotesEntry> {
    let mut fresh = Vec::new();
    for entry in entries {
        if status
            .last_entry_id
            .as_deref()
            .is_some_and(|id| entry.matches(id))
        {
            break;
        }
        if let (Some(cutoff), Some(published)) = (status.last_entry_published_at, entry.published_at) {
            if published <= cutoff {
                break;
            }
        }
        fresh.push(entry.clone());
    }
    fresh.reverse();
    fresh
}
