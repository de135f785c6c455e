use crate::discord::commands::guard::{guild_id, moderator_check, say_ephemeral, surface};
use crate::discord::feeds::dispatcher;
use crate::discord::{Context, Error};

/// Game update notes announcements
#[poise::command(slash_command, guild_only, subcommands("force"))]
pub async fn update_notes(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Post the latest game update notes now (testing only)
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn force(ctx: Context<'_>) -> Result<(), Error> {
    if ctx.data().production {
        return say_ephemeral(ctx, "This command is disabled in production.").await;
    }
    let guild_id = guild_id(&ctx)?;
    let Some(config) = surface(ctx, ctx.data().config.get_config(guild_id).await).await? else {
        return Ok(());
    };
    let Some(channel_id) = config.update_notes_channel_id else {
        return say_ephemeral(
            ctx,
            "❌ No update notes channel is configured. Set one with `/config update_notes_channel`.",
        )
        .await;
    };

    ctx.defer_ephemeral().await?;
    let result = ctx.data().update_notes.force_latest(guild_id, channel_id).await;
    let Some(post) = surface(ctx, result).await? else {
        return Ok(());
    };
    if let Err(e) = dispatcher::send_update_note(ctx.http(), &post).await {
        return say_ephemeral(ctx, format!("❌ Could not post in <#{channel_id}>: {e}")).await;
    }
    say_ephemeral(ctx, format!("✅ Posted **{}** in <#{channel_id}>.", post.entry.title)).await
}
