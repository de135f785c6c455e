use crate::core::audit::audit_models::truncate;
use crate::core::feeds::html_to_text;
use crate::core::rss::FeedPost;
use crate::core::update_notes::UpdateNotesPost;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;

const RSS_COLOR: u32 = 0xF26522;
const UPDATE_NOTES_COLOR: u32 = 0xB31B1B;
const SUMMARY_LIMIT: usize = 1000;
const UPDATE_NOTES_LIMIT: usize = 3500;

/// Send RSS entries to their subscription channels, oldest first as given.
pub async fn send_feed_posts(http: &serenity::Http, posts: Vec<FeedPost>) {
    for post in posts {
        let message = serenity::CreateMessage::new().embed(build_feed_embed(&post));
        if let Err(err) = serenity::ChannelId::new(post.channel_id)
            .send_message(http, message)
            .await
        {
            tracing::warn!(
                guild_id = post.guild_id,
                channel_id = post.channel_id,
                feed = %post.feed_name,
                error = %err,
                "Failed to send RSS entry"
            );
        }
    }
}

pub async fn send_update_notes(http: &serenity::Http, posts: Vec<UpdateNotesPost>) {
    for post in posts {
        if let Err(err) = send_update_note(http, &post).await {
            tracing::warn!(
                guild_id = post.guild_id,
                channel_id = post.channel_id,
                entry_id = %post.entry.entry_id,
                error = %err,
                "Failed to send game update notes"
            );
        }
    }
}

pub async fn send_update_note(http: &serenity::Http, post: &UpdateNotesPost) -> Result<(), serenity::Error> {
    let message = serenity::CreateMessage::new().embed(build_update_notes_embed(post));
    serenity::ChannelId::new(post.channel_id)
        .send_message(http, message)
        .await?;
    Ok(())
}

pub fn build_feed_embed(post: &FeedPost) -> serenity::CreateEmbed {
    let entry = &post.entry;
    let title = entry
        .title
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or("New post");

    let mut embed = serenity::CreateEmbed::new()
        .title(truncate(title, 256))
        .color(RSS_COLOR);

    if let Some(link) = &entry.link {
        embed = embed.url(link);
    }
    if let Some(summary) = entry.summary.as_deref().map(html_to_text).filter(|s| !s.is_empty()) {
        embed = embed.description(truncate(&summary, SUMMARY_LIMIT));
    }

    let source = post.feed_title.clone().unwrap_or_else(|| post.feed_name.clone());
    let mut author = serenity::CreateEmbedAuthor::new(truncate(&source, 256))
        .url(post.feed_link.as_deref().unwrap_or(&post.feed_url));
    if let Some(icon) = &post.feed_icon {
        author = author.icon_url(icon);
    }
    embed = embed.author(author);

    if let Some(writer) = &entry.author {
        embed = embed.field("Author", truncate(writer, 256), true);
    }
    if !entry.tags.is_empty() {
        let tags = entry.tags.iter().take(5).cloned().collect::<Vec<_>>().join(", ");
        embed = embed.field("Tags", truncate(&tags, 1024), true);
    }
    if let Some(thumbnail) = &entry.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }
    if let Some(timestamp) = to_timestamp(entry.published) {
        embed = embed.timestamp(timestamp);
    }
    embed.footer(serenity::CreateEmbedFooter::new(format!("RSS: {}", post.feed_name)))
}

pub fn build_update_notes_embed(post: &UpdateNotesPost) -> serenity::CreateEmbed {
    let entry = &post.entry;
    let mut embed = serenity::CreateEmbed::new()
        .title(truncate(&entry.title, 256))
        .url(&entry.url)
        .color(UPDATE_NOTES_COLOR)
        .author(serenity::CreateEmbedAuthor::new("Guild Wars 2 Forums"))
        .footer(serenity::CreateEmbedFooter::new("Game update notes"));

    let summary = if entry.summary.is_empty() {
        format!("Read the full notes on the [forums]({}).", entry.url)
    } else {
        truncate(&entry.summary, UPDATE_NOTES_LIMIT)
    };
    embed = embed.description(summary);

    if let Some(timestamp) = to_timestamp(entry.published_at) {
        embed = embed.timestamp(timestamp);
    }
    embed
}

fn to_timestamp(value: Option<DateTime<Utc>>) -> Option<serenity::Timestamp> {
    value.and_then(|dt| serenity::Timestamp::from_unix_timestamp(dt.timestamp()).ok())
}
