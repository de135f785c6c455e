use crate::core::feeds::{html_to_text, FeedEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Official forum feed; game update notes are posted as comments in it.
pub const GAME_UPDATE_NOTES_FEED_URL: &str = "https://en-forum.guildwars2.com/discover/6.xml";
const TITLE_MARKER: &str = "game update notes";

/// Per-guild position in the update notes feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateNotesStatus {
    #[serde(default)]
    pub last_entry_id: Option<String>,
    #[serde(default)]
    pub last_entry_published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatchNotesEntry {
    /// The `comment` query parameter of the link, else the guid.
    pub entry_id: String,
    pub title: String,
    pub url: String,
    pub comment_id: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Plain text rendered from the feed description.
    pub summary: String,
    /// Older identity forms a stored status may still hold.
    pub legacy_ids: Vec<String>,
}

impl PatchNotesEntry {
    /// `None` for entries that are not game update notes or have no link.
    pub fn from_feed_entry(entry: &FeedEntry) -> Option<Self> {
        let title = entry.title.as_deref()?.trim();
        if !title.to_lowercase().contains(TITLE_MARKER) {
            return None;
        }
        let url = entry.link.as_deref()?.trim();
        if url.is_empty() {
            return None;
        }

        let comment_id = url::Url::parse(url).ok().and_then(|parsed| {
            parsed
                .query_pairs()
                .find(|(key, _)| key == "comment")
                .map(|(_, value)| value.into_owned())
                .filter(|value| !value.is_empty())
        });
        let guid = entry
            .guid
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .unwrap_or(url)
            .to_string();
        let entry_id = comment_id.clone().unwrap_or_else(|| guid.clone());

        let mut legacy_ids: Vec<String> = Vec::new();
        let mut candidates = vec![guid, url.to_string()];
        if let Some(comment) = &comment_id {
            candidates.push(format!("comment={comment}"));
            candidates.push(format!("/comment/{comment}"));
        }
        for candidate in candidates {
            if candidate != entry_id && !legacy_ids.contains(&candidate) {
                legacy_ids.push(candidate);
            }
        }

        Some(Self {
            entry_id,
            title: title.to_string(),
            url: url.to_string(),
            comment_id,
            published_at: entry.published,
            summary: entry.summary.as_deref().map(html_to_text).unwrap_or_default(),
            legacy_ids,
        })
    }

    /// Whether a stored identity refers to this entry.
    pub fn matches(&self, stored_id: &str) -> bool {
        self.entry_id == stored_id || self.legacy_ids.iter().any(|id| id == stored_id)
    }
}

/// One update notes entry to send to a guild's configured channel.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateNotesPost {
    pub guild_id: u64,
    pub channel_id: u64,
    pub entry: PatchNotesEntry,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_entry(title: &str, link: &str) -> FeedEntry {
        FeedEntry {
            guid: Some("https://en-forum.guildwars2.com/topic/1".into()),
            link: Some(link.into()),
            title: Some(title.into()),
            summary: Some("<p>Fixed a bug.</p>".into()),
            ..Default::default()
        }
    }

    #[test]
    fn comment_query_becomes_the_id() {
        let entry = PatchNotesEntry::from_feed_entry(&feed_entry(
            "Game Update Notes: May 7, 2024",
            "https://en-forum.guildwars2.com/topic/1/?do=findComment&comment=2233",
        ))
        .unwrap();

        assert_eq!(entry.entry_id, "2233");
        assert_eq!(entry.comment_id.as_deref(), Some("2233"));
        assert_eq!(entry.summary, "Fixed a bug.");
        assert!(entry.matches("2233"));
        assert!(entry.matches("https://en-forum.guildwars2.com/topic/1"));
        assert!(entry.matches("comment=2233"));
        assert!(!entry.matches("2234"));
    }

    #[test]
    fn falls_back_to_guid_without_comment() {
        let entry = PatchNotesEntry::from_feed_entry(&feed_entry(
            "Game Update Notes",
            "https://en-forum.guildwars2.com/topic/1/",
        ))
        .unwrap();
        assert_eq!(entry.entry_id, "https://en-forum.guildwars2.com/topic/1");
        assert!(entry.matches("https://en-forum.guildwars2.com/topic/1/"));
    }

    #[test]
    fn other_threads_are_ignored() {
        assert!(PatchNotesEntry::from_feed_entry(&feed_entry(
            "Community showcase",
            "https://en-forum.guildwars2.com/topic/2/"
        ))
        .is_none());
    }
}
