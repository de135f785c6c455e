use crate::core::audit::audit_models::truncate;
use crate::core::audit::AuditRecord;
use crate::discord::Data;
use anyhow::Result;
use poise::serenity_prelude::{self as serenity, Context, Mentionable};

const DELETED_CONTENT_LIMIT: usize = 500;

/// Append a record to the guild's audit log and echo it to the configured
/// audit channel. Failures are logged; callers carry on either way.
pub async fn report(http: &serenity::Http, data: &Data, guild_id: u64, record: AuditRecord) {
    if let Err(e) = data.audit.record(guild_id, &record).await {
        tracing::error!(guild_id, event_type = %record.event_type, error = %e, "Failed to store audit event");
    }

    let channel_id = match data.config.get_config(guild_id).await {
        Ok(config) => config.audit_channel_id,
        Err(e) => {
            tracing::error!(guild_id, error = %e, "Failed to load guild config for audit echo");
            return;
        }
    };
    let Some(channel_id) = channel_id else {
        return;
    };

    let message = serenity::CreateMessage::new()
        .content(truncate(&record.channel_message(), 2000))
        .allowed_mentions(serenity::CreateAllowedMentions::new());
    if let Err(e) = serenity::ChannelId::new(channel_id)
        .send_message(http, message)
        .await
    {
        tracing::warn!(guild_id, channel_id, error = %e, "Failed to echo audit event");
    }
}

pub async fn handle_member_join(ctx: &Context, data: &Data, member: &serenity::Member) -> Result<()> {
    let record = AuditRecord::new(
        "member_join",
        format!(
            "{} joined. Account created {}.",
            member.mention(),
            member.user.created_at().format("%Y-%m-%d")
        ),
    )
    .with_target(member.user.id.get(), Some(member.user.name.clone()));

    report(&ctx.http, data, member.guild_id.get(), record).await;
    Ok(())
}

pub async fn handle_member_remove(
    ctx: &Context,
    data: &Data,
    guild_id: serenity::GuildId,
    user: &serenity::User,
    member_data: Option<&serenity::Member>,
) -> Result<()> {
    let joined = member_data
        .and_then(|m| m.joined_at)
        .map(|t| format!(" Joined {}.", t.format("%Y-%m-%d")))
        .unwrap_or_default();
    let record = AuditRecord::new("member_leave", format!("{} left.{}", user.mention(), joined))
        .with_target(user.id.get(), Some(user.name.clone()));

    report(&ctx.http, data, guild_id.get(), record).await;
    Ok(())
}

pub async fn handle_message_delete(
    ctx: &Context,
    data: &Data,
    channel_id: serenity::ChannelId,
    message_id: serenity::MessageId,
    guild_id: Option<serenity::GuildId>,
) -> Result<()> {
    let Some(guild_id) = guild_id else {
        return Ok(());
    };

    // Clone out of the cache so no cache guard is held across an await.
    let cached = ctx
        .cache
        .message(channel_id, message_id)
        .map(|message| message.clone());

    let record = match cached {
        Some(message) if message.author.bot => return Ok(()),
        Some(message) => {
            let content = if message.content.trim().is_empty() {
                "*(no text content)*".to_string()
            } else {
                truncate(&message.content, DELETED_CONTENT_LIMIT)
            };
            AuditRecord::new(
                "message_delete",
                format!(
                    "Message by {} deleted in {}:\n{}",
                    message.author.mention(),
                    channel_id.mention(),
                    content
                ),
            )
            .with_target(message.author.id.get(), Some(message.author.name.clone()))
        }
        None => AuditRecord::new(
            "message_delete",
            format!(
                "A message ({}) was deleted in {}. It was not cached.",
                message_id.get(),
                channel_id.mention()
            ),
        ),
    };

    report(&ctx.http, data, guild_id.get(), record).await;
    Ok(())
}
