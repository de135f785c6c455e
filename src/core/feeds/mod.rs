// Port for fetching RSS/Atom documents. The reqwest + feed-rs implementation
// lives in `infra::feeds`; the RSS and update-notes pollers take it as a
// generic so tests can hand them canned feeds.

pub mod feed_models;

pub use feed_models::{html_to_text, Feed, FeedEntry};

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Failed to fetch {url}: {detail}")]
    Transport { url: String, detail: String },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{url} is not a valid RSS or Atom feed: {detail}")]
    Parse { url: String, detail: String },
}

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Entries come back in document order, newest first for well-behaved feeds.
    async fn fetch(&self, url: &str) -> Result<Feed, FetchError>;
}
