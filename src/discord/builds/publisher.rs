// Build posts live in the guild's build channel: a thread per build when the
// channel is a forum, a plain message otherwise.

use crate::core::audit::audit_models::truncate;
use crate::core::builds::{BuildPostLocation, BuildRecord};
use poise::serenity_prelude as serenity;

pub fn build_embed(build: &BuildRecord) -> serenity::CreateEmbed {
    let mut embed = serenity::CreateEmbed::new()
        .title(truncate(&build.name, 256))
        .color(build.class.color())
        .field("Class", build.class.display_with_profession(), true)
        .field("Build id", format!("`{}`", build.build_id), true)
        .field("Chat code", format!("```\n{}\n```", truncate(&build.chat_code, 1000)), false)
        .footer(serenity::CreateEmbedFooter::new(build.footer()));

    if let Some(url) = &build.url {
        embed = embed.url(url).field("Link", truncate(url, 1024), false);
    }
    if let Some(description) = &build.description {
        embed = embed.description(truncate(description, 4000));
    }
    embed
}

/// Post a new build to `channel_id` and report where it landed.
pub async fn publish(
    http: &serenity::Http,
    channel_id: u64,
    build: &BuildRecord,
) -> Result<BuildPostLocation, serenity::Error> {
    let channel = serenity::ChannelId::new(channel_id);
    let is_forum = matches!(
        channel.to_channel(http).await?,
        serenity::Channel::Guild(ref guild_channel) if guild_channel.kind == serenity::ChannelType::Forum
    );

    let message = serenity::CreateMessage::new().embed(build_embed(build));
    if is_forum {
        let thread = channel
            .create_forum_post(
                http,
                serenity::CreateForumPost::new(truncate(&build.name, 100), message),
            )
            .await?;
        // A forum post's starter message shares the thread's id.
        Ok(BuildPostLocation {
            channel_id,
            message_id: thread.id.get(),
            thread_id: Some(thread.id.get()),
        })
    } else {
        let sent = channel.send_message(http, message).await?;
        Ok(BuildPostLocation {
            channel_id,
            message_id: sent.id.get(),
            thread_id: None,
        })
    }
}

/// Update an existing post in place, renaming its thread when it has one.
pub async fn refresh(
    http: &serenity::Http,
    location: BuildPostLocation,
    build: &BuildRecord,
) -> Result<(), serenity::Error> {
    let container = serenity::ChannelId::new(location.thread_id.unwrap_or(location.channel_id));
    container
        .edit_message(
            http,
            serenity::MessageId::new(location.message_id),
            serenity::EditMessage::new().embed(build_embed(build)),
        )
        .await?;

    if location.thread_id.is_some() {
        container
            .edit_thread(http, serenity::EditThread::new().name(truncate(&build.name, 100)))
            .await?;
    }
    Ok(())
}

pub async fn remove(http: &serenity::Http, location: BuildPostLocation) -> Result<(), serenity::Error> {
    match location.thread_id {
        Some(thread_id) => {
            serenity::ChannelId::new(thread_id).delete(http).await?;
        }
        None => {
            serenity::ChannelId::new(location.channel_id)
                .delete_message(http, serenity::MessageId::new(location.message_id))
                .await?;
        }
    }
    Ok(())
}
