// Personal GW2 API keys. Every reply is ephemeral; keys are never echoed in
// full.

use crate::core::accounts::KeySummary;
use crate::discord::commands::guard::{guild_id, say_ephemeral, surface};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Manage your Guild Wars 2 API keys
#[poise::command(slash_command, guild_only, subcommands("add", "remove", "list", "refresh"))]
pub async fn apikey(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Save a GW2 API key
#[poise::command(slash_command, guild_only)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "API key from account.arena.net/applications"] key: String,
    #[description = "Name for this key (defaults to the account name)"] name: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    ctx.defer_ephemeral().await?;
    let result = ctx
        .data()
        .accounts
        .add_key(guild_id, ctx.author().id.get(), &key, name.as_deref())
        .await;
    let Some(summary) = surface(ctx, result).await? else {
        return Ok(());
    };
    ctx.send(
        poise::CreateReply::default()
            .content(format!("✅ Saved key **{}**.", summary.record.name))
            .embed(key_embed(&summary))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Remove a saved API key
#[poise::command(slash_command, guild_only)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Key name"]
    #[autocomplete = "autocomplete_key_name"]
    name: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let result = ctx
        .data()
        .accounts
        .remove_key(guild_id, ctx.author().id.get(), &name)
        .await;
    let Some(removed) = surface(ctx, result).await? else {
        return Ok(());
    };
    say_ephemeral(ctx, format!("🗑️ Removed key **{}**.", removed.name)).await
}

/// List your saved API keys
#[poise::command(slash_command, guild_only)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let result = ctx.data().accounts.list_keys(guild_id, ctx.author().id.get()).await;
    let Some(keys) = surface(ctx, result).await? else {
        return Ok(());
    };
    if keys.is_empty() {
        return say_ephemeral(ctx, "You have no saved API keys. Add one with `/apikey add`.").await;
    }

    let mut reply = poise::CreateReply::default().ephemeral(true);
    // Discord allows ten embeds per message.
    for summary in keys.iter().take(10) {
        reply = reply.embed(key_embed(summary));
    }
    ctx.send(reply).await?;
    Ok(())
}

/// Re-check a saved key against the GW2 API
#[poise::command(slash_command, guild_only)]
pub async fn refresh(
    ctx: Context<'_>,
    #[description = "Key name"]
    #[autocomplete = "autocomplete_key_name"]
    name: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    ctx.defer_ephemeral().await?;
    let result = ctx
        .data()
        .accounts
        .refresh_key(guild_id, ctx.author().id.get(), &name)
        .await;
    let Some(summary) = surface(ctx, result).await? else {
        return Ok(());
    };
    ctx.send(
        poise::CreateReply::default()
            .content(format!("🔄 Refreshed key **{}**.", summary.record.name))
            .embed(key_embed(&summary))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

fn key_embed(summary: &KeySummary) -> serenity::CreateEmbed {
    let record = &summary.record;
    let guilds = if summary.guild_labels.is_empty() {
        "None".to_string()
    } else {
        summary.guild_labels.join("\n")
    };
    let missing = record.missing_permissions();
    let permissions = if record.permissions.is_empty() {
        "None".to_string()
    } else {
        record.permissions.join(", ")
    };

    let mut embed = serenity::CreateEmbed::new()
        .title(&record.name)
        .color(0xC0392B)
        .field("Account", &record.account_name, true)
        .field("Key", format!("`{}`", record.masked_key()), true)
        .field("Permissions", permissions, false)
        .field("Guilds", guilds, false)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Updated {}",
            record.updated_at.format("%Y-%m-%d %H:%M UTC")
        )));
    if !missing.is_empty() {
        embed = embed.field(
            "⚠️ Missing permissions",
            format!("{}. Some features will not work with this key.", missing.join(", ")),
            false,
        );
    }
    embed
}

async fn autocomplete_key_name<'a>(ctx: Context<'_>, partial: &'a str) -> impl Iterator<Item = String> + 'a {
    let names = match ctx.guild_id() {
        Some(guild_id) => ctx
            .data()
            .accounts
            .list_keys(guild_id.get(), ctx.author().id.get())
            .await
            .map(|keys| keys.into_iter().map(|k| k.record.name).collect::<Vec<_>>())
            .unwrap_or_default(),
        None => Vec::new(),
    };
    let needle = partial.to_lowercase();
    names
        .into_iter()
        .filter(move |name| name.to_lowercase().contains(&needle))
        .take(25)
}
