use crate::discord::commands::config::report_change;
use crate::discord::commands::guard::{guild_id, join_capped, moderator_check, say_ephemeral, surface};
use crate::discord::{Context, Error};

const RECENT_LIMIT: u32 = 10;
// Rows are at most 1000 characters, so at least one always fits.
const REPLY_LIMIT: usize = 1890;

/// Browse the server's audit log
#[poise::command(
    slash_command,
    guild_only,
    subcommands("recent", "query", "gw2_query", "gw2_key", "gw2_guild")
)]
pub async fn audit(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show the latest audit events
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn recent(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(events) = surface(ctx, ctx.data().audit.recent(guild_id, RECENT_LIMIT).await).await? else {
        return Ok(());
    };
    let rows: Vec<String> = events.iter().map(|e| e.format_row()).collect();
    reply_rows(ctx, "No audit events recorded yet.", rows).await
}

/// Search Discord audit events by user
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn query(
    ctx: Context<'_>,
    #[description = "Mention, user id, or part of a name"] user: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(events) = surface(ctx, ctx.data().audit.query(guild_id, &user).await).await? else {
        return Ok(());
    };
    let rows: Vec<String> = events.iter().map(|e| e.format_row()).collect();
    reply_rows(ctx, "No matching audit events.", rows).await
}

/// Search GW2 guild log events by account name
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn gw2_query(
    ctx: Context<'_>,
    #[description = "Account name or part of it, e.g. Name.1234"] account: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(events) = surface(ctx, ctx.data().audit.query_gw2(guild_id, &account).await).await? else {
        return Ok(());
    };
    let rows: Vec<String> = events.iter().map(|e| e.format_row()).collect();
    reply_rows(ctx, "No matching GW2 guild log events.", rows).await
}

/// Store a GW2 API key used to sync the guild log (leave key empty to remove)
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn gw2_key(
    ctx: Context<'_>,
    #[description = "Name for this key"] name: String,
    #[description = "GW2 API key with the guilds permission"] key: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let removing = key.as_deref().map_or(true, |k| k.trim().is_empty());
    let result = ctx
        .data()
        .config
        .set_audit_gw2_key(guild_id, ctx.author().id.get(), &name, key.as_deref())
        .await;
    let confirmation = if removing {
        format!("✅ Removed GW2 audit key `{}`.", name.trim().to_lowercase())
    } else {
        format!("✅ Saved GW2 audit key `{}`.", name.trim().to_lowercase())
    };
    report_change(ctx, guild_id, result, confirmation).await
}

/// Set the GW2 guild whose log is synced (leave empty to stop syncing)
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn gw2_guild(
    ctx: Context<'_>,
    #[description = "GW2 guild id (GUID)"] gw2_guild_id: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let result = ctx
        .data()
        .config
        .set_audit_gw2_guild(guild_id, ctx.author().id.get(), gw2_guild_id.as_deref())
        .await;
    let confirmation = match gw2_guild_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => format!("✅ GW2 guild log sync will use `{id}`."),
        None => "✅ GW2 guild log sync disabled.".to_string(),
    };
    report_change(ctx, guild_id, result, confirmation).await
}

async fn reply_rows(ctx: Context<'_>, empty: &str, rows: Vec<String>) -> Result<(), Error> {
    if rows.is_empty() {
        return say_ephemeral(ctx, empty).await;
    }
    let body = join_capped(&rows, REPLY_LIMIT);
    say_ephemeral(ctx, format!("```\n{}```", body)).await
}
