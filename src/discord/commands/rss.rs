use crate::core::rss::FeedSubscription;
use crate::discord::audit;
use crate::discord::commands::guard::{guild_id, join_capped, moderator_check, say_ephemeral, surface};
use crate::discord::feeds::dispatcher;
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Manage RSS feed subscriptions
#[poise::command(slash_command, guild_only, subcommands("set", "delete", "list", "test"))]
pub async fn rss(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Subscribe a channel to a feed, or update an existing subscription
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn set(
    ctx: Context<'_>,
    #[description = "Subscription name"] name: String,
    #[description = "RSS or Atom feed URL"] url: String,
    #[description = "Channel new entries are posted to"]
    #[channel_types("Text", "News")]
    channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    ctx.defer_ephemeral().await?;
    let result = ctx
        .data()
        .rss
        .set_feed(guild_id, ctx.author().id.get(), &name, &url, channel.id.get())
        .await;
    let Some((subscription, record)) = surface(ctx, result).await? else {
        return Ok(());
    };
    audit::report(ctx.http(), ctx.data(), guild_id, record.with_actor_name(ctx.author().name.clone())).await;
    say_ephemeral(
        ctx,
        format!(
            "✅ **{}** will post new entries in <#{}>. Existing entries are skipped.",
            subscription.name, subscription.channel_id
        ),
    )
    .await
}

/// Remove a feed subscription
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "Subscription"]
    #[autocomplete = "autocomplete_feed"]
    name: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let result = ctx
        .data()
        .rss
        .delete_feed(guild_id, ctx.author().id.get(), &name)
        .await;
    let Some((removed, record)) = surface(ctx, result).await? else {
        return Ok(());
    };
    audit::report(ctx.http(), ctx.data(), guild_id, record.with_actor_name(ctx.author().name.clone())).await;
    say_ephemeral(ctx, format!("🗑️ Removed feed **{}**.", removed.name)).await
}

/// List feed subscriptions
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(feeds) = surface(ctx, ctx.data().rss.list_feeds(guild_id).await).await? else {
        return Ok(());
    };
    if feeds.is_empty() {
        return say_ephemeral(ctx, "No feeds configured. Add one with `/rss set`.").await;
    }
    let lines: Vec<String> = feeds.iter().map(feed_line).collect();
    say_ephemeral(ctx, join_capped(&lines, 1900)).await
}

/// Post a feed's newest entry here (testing only)
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn test(
    ctx: Context<'_>,
    #[description = "Subscription"]
    #[autocomplete = "autocomplete_feed"]
    name: String,
) -> Result<(), Error> {
    if ctx.data().production {
        return say_ephemeral(ctx, "This command is disabled in production.").await;
    }
    let guild_id = guild_id(&ctx)?;
    ctx.defer().await?;
    let Some(post) = surface(ctx, ctx.data().rss.latest_entry(guild_id, &name).await).await? else {
        return Ok(());
    };
    ctx.send(poise::CreateReply::default().embed(dispatcher::build_feed_embed(&post)))
        .await?;
    Ok(())
}

fn feed_line(feed: &FeedSubscription) -> String {
    let last_seen = feed
        .last_entry_published_at
        .map(|at| format!("last entry <t:{}:R>", at.timestamp()))
        .unwrap_or_else(|| "no entries seen yet".to_string());
    format!("• **{}** → <#{}> ({last_seen})\n  <{}>", feed.name, feed.channel_id, feed.url)
}

async fn autocomplete_feed<'a>(ctx: Context<'_>, partial: &'a str) -> impl Iterator<Item = String> + 'a {
    let names = match ctx.guild_id() {
        Some(guild_id) => ctx
            .data()
            .rss
            .search_feeds(guild_id.get(), partial)
            .await
            .unwrap_or_default(),
        None => Vec::new(),
    };
    names.into_iter()
}
