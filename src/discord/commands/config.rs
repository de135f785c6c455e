// Guild configuration commands. Every change is written to the audit log.

use crate::core::audit::AuditRecord;
use crate::discord::audit;
use crate::discord::commands::guard::{channel_label, guild_id, moderator_check, say_ephemeral, surface};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Configure the bot for this server
#[poise::command(
    slash_command,
    guild_only,
    subcommands(
        "show",
        "moderator_add",
        "moderator_remove",
        "moderator_reset",
        "build_channel",
        "update_notes_channel",
        "audit_channel"
    )
)]
pub async fn config(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show the current configuration
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn show(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(config) = surface(ctx, ctx.data().config.get_config(guild_id).await).await? else {
        return Ok(());
    };

    let roles = if config.moderator_role_ids.is_empty() {
        "Administrators only".to_string()
    } else {
        config
            .moderator_role_ids
            .iter()
            .map(|id| format!("<@&{id}>"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let keys = if config.audit_gw2_api_keys.is_empty() {
        "None".to_string()
    } else {
        config
            .audit_gw2_api_keys
            .keys()
            .map(|name| format!("`{name}`"))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let embed = serenity::CreateEmbed::new()
        .title("Server configuration")
        .color(0x3498db)
        .field("Moderator roles", roles, false)
        .field("Build channel", channel_label(config.build_channel_id), true)
        .field("Update notes channel", channel_label(config.update_notes_channel_id), true)
        .field("Audit channel", channel_label(config.audit_channel_id), true)
        .field(
            "GW2 audit guild",
            config.audit_gw2_guild_id.as_deref().unwrap_or("Not set"),
            true,
        )
        .field("GW2 audit keys", keys, true);

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Allow a role to manage the bot
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn moderator_add(
    ctx: Context<'_>,
    #[description = "Role to grant moderator access"] role: serenity::Role,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let result = ctx
        .data()
        .config
        .add_moderator_role(guild_id, ctx.author().id.get(), role.id.get())
        .await;
    report_change(ctx, guild_id, result, format!("✅ {} can now manage the bot.", role.name)).await
}

/// Remove a moderator role
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn moderator_remove(
    ctx: Context<'_>,
    #[description = "Role to remove"] role: serenity::Role,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let result = ctx
        .data()
        .config
        .remove_moderator_role(guild_id, ctx.author().id.get(), role.id.get())
        .await;
    report_change(ctx, guild_id, result, format!("✅ {} is no longer a moderator role.", role.name)).await
}

/// Clear all moderator roles (administrators only afterwards)
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn moderator_reset(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let result = ctx
        .data()
        .config
        .reset_moderator_roles(guild_id, ctx.author().id.get())
        .await;
    report_change(
        ctx,
        guild_id,
        result,
        "✅ Moderator roles cleared. Only administrators can manage the bot now.".to_string(),
    )
    .await
}

/// Set or clear the channel builds are posted to
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn build_channel(
    ctx: Context<'_>,
    #[description = "Text or forum channel (leave empty to clear)"]
    #[channel_types("Text", "Forum")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let channel_id = channel.as_ref().map(|c| c.id.get());
    let result = ctx
        .data()
        .config
        .set_build_channel(guild_id, ctx.author().id.get(), channel_id)
        .await;
    report_change(ctx, guild_id, result, format!("✅ Build channel: {}", channel_label(channel_id))).await
}

/// Set or clear the channel game update notes are posted to
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn update_notes_channel(
    ctx: Context<'_>,
    #[description = "Text channel (leave empty to clear)"]
    #[channel_types("Text", "News")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let channel_id = channel.as_ref().map(|c| c.id.get());
    let result = ctx
        .data()
        .config
        .set_update_notes_channel(guild_id, ctx.author().id.get(), channel_id)
        .await;
    report_change(ctx, guild_id, result, format!("✅ Update notes channel: {}", channel_label(channel_id))).await
}

/// Set or clear the channel audit events are echoed to
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn audit_channel(
    ctx: Context<'_>,
    #[description = "Text channel (leave empty to clear)"]
    #[channel_types("Text")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let channel_id = channel.as_ref().map(|c| c.id.get());
    let result = ctx
        .data()
        .config
        .set_audit_channel(guild_id, ctx.author().id.get(), channel_id)
        .await;
    report_change(ctx, guild_id, result, format!("✅ Audit channel: {}", channel_label(channel_id))).await
}

/// Log a successful change to the audit trail and confirm it to the moderator.
pub async fn report_change(
    ctx: Context<'_>,
    guild_id: u64,
    result: Result<AuditRecord, crate::core::config::ConfigError>,
    confirmation: String,
) -> Result<(), Error> {
    let Some(record) = surface(ctx, result).await? else {
        return Ok(());
    };
    audit::report(
        ctx.http(),
        ctx.data(),
        guild_id,
        record.with_actor_name(ctx.author().name.clone()),
    )
    .await;
    say_ephemeral(ctx, confirmation).await
}
