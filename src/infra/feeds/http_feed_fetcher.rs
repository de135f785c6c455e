use crate::core::feeds::{Feed, FeedEntry, FeedFetcher, FetchError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches RSS/Atom documents over HTTP and parses them with feed-rs.
pub struct HttpFeedFetcher {
    client: Client,
}

impl HttpFeedFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept",
            HeaderValue::from_static("application/rss+xml, application/atom+xml, application/xml;q=0.9, */*;q=0.8"),
        );
        headers.insert("User-Agent", HeaderValue::from_static("GW2ToolsBot/0.3"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Feed, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
        parse_feed(url, &body)
    }
}

pub fn parse_feed(url: &str, body: &[u8]) -> Result<Feed, FetchError> {
    let parsed = feed_rs::parser::parse(body).map_err(|e| FetchError::Parse {
        url: url.to_string(),
        detail: e.to_string(),
    })?;

    Ok(Feed {
        title: parsed.title.map(|t| t.content.trim().to_string()),
        link: parsed.links.first().map(|l| l.href.clone()),
        icon: parsed
            .icon
            .or(parsed.logo)
            .map(|image| image.uri),
        entries: parsed.entries.into_iter().map(map_entry).collect(),
    })
}

fn map_entry(entry: feed_rs::model::Entry) -> FeedEntry {
    let summary = entry
        .content
        .and_then(|content| content.body)
        .or_else(|| entry.summary.map(|text| text.content));

    let thumbnail = entry.media.iter().find_map(|media| {
        media
            .thumbnails
            .first()
            .map(|thumb| thumb.image.uri.clone())
            .or_else(|| {
                media.content.iter().find_map(|content| {
                    let is_image = content
                        .content_type
                        .as_ref()
                        .is_some_and(|mime| mime.ty() == "image");
                    if is_image {
                        content.url.as_ref().map(|url| url.to_string())
                    } else {
                        None
                    }
                })
            })
    });

    FeedEntry {
        guid: Some(entry.id).filter(|id| !id.trim().is_empty()),
        link: entry.links.first().map(|l| l.href.clone()),
        title: entry.title.map(|t| t.content.trim().to_string()),
        summary,
        published: entry.published.or(entry.updated),
        author: entry.authors.first().map(|a| a.name.clone()),
        tags: entry
            .categories
            .into_iter()
            .map(|c| c.label.unwrap_or(c.term))
            .collect(),
        thumbnail,
    }
}
