use crate::core::builds::{BuildInput, BuildRecord};
use crate::core::professions::GameClass;
use crate::discord::audit;
use crate::discord::builds::publisher;
use crate::discord::commands::guard::{guild_id, join_capped, moderator_check, say_ephemeral, surface};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::warn;

/// Share and browse builds
#[poise::command(slash_command, guild_only, subcommands("add", "edit", "delete", "list", "show"))]
pub async fn builds(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Add a build and post it to the build channel
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Build name"] name: String,
    #[description = "Profession or elite specialization"]
    #[autocomplete = "autocomplete_class"]
    class: String,
    #[description = "In-game build template chat code"] chat_code: String,
    #[description = "Link to a build guide"] url: Option<String>,
    #[description = "Short description"] description: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let input = BuildInput {
        name,
        class,
        chat_code,
        url,
        description,
    };
    let result = ctx
        .data()
        .builds
        .add_build(guild_id, ctx.author().id.get(), input)
        .await;
    let Some((build, record)) = surface(ctx, result).await? else {
        return Ok(());
    };
    audit::report(ctx.http(), ctx.data(), guild_id, record.with_actor_name(ctx.author().name.clone())).await;

    let posted = post_build(ctx, guild_id, &build).await?;
    say_ephemeral(ctx, format!("✅ Added build **{}** (`{}`).{}", build.name, build.build_id, posted)).await
}

/// Edit a build; omitted fields keep their value
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn edit(
    ctx: Context<'_>,
    #[description = "Build"]
    #[autocomplete = "autocomplete_build"]
    build: String,
    #[description = "New name"] name: Option<String>,
    #[description = "New class"]
    #[autocomplete = "autocomplete_class"]
    class: Option<String>,
    #[description = "New chat code"] chat_code: Option<String>,
    #[description = "New link (\"none\" to clear)"] url: Option<String>,
    #[description = "New description (\"none\" to clear)"] description: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(current) = surface(ctx, ctx.data().builds.find_build(guild_id, &build).await).await? else {
        return Ok(());
    };
    let input = BuildInput {
        name: name.unwrap_or_else(|| current.name.clone()),
        class: class.unwrap_or_else(|| current.class.name().to_string()),
        chat_code: chat_code.unwrap_or_else(|| current.chat_code.clone()),
        url: merge_optional(url, &current.url),
        description: merge_optional(description, &current.description),
    };
    let result = ctx
        .data()
        .builds
        .edit_build(guild_id, ctx.author().id.get(), &current.build_id, input)
        .await;
    let Some((updated, record)) = surface(ctx, result).await? else {
        return Ok(());
    };
    audit::report(ctx.http(), ctx.data(), guild_id, record.with_actor_name(ctx.author().name.clone())).await;

    let note = match updated.post_location() {
        Some(location) => match publisher::refresh(ctx.http(), location, &updated).await {
            Ok(()) => String::new(),
            Err(e) => {
                warn!(guild_id, build_id = %updated.build_id, error = %e, "Failed to update build post; reposting");
                post_build(ctx, guild_id, &updated).await?
            }
        },
        None => post_build(ctx, guild_id, &updated).await?,
    };
    say_ephemeral(ctx, format!("✅ Updated build **{}**.{}", updated.name, note)).await
}

/// Delete a build and its post
#[poise::command(slash_command, guild_only, check = "moderator_check")]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "Build"]
    #[autocomplete = "autocomplete_build"]
    build: String,
    #[description = "Type the build name to confirm"] confirm: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let result = ctx
        .data()
        .builds
        .delete_build(guild_id, ctx.author().id.get(), &build, &confirm)
        .await;
    let Some((removed, record)) = surface(ctx, result).await? else {
        return Ok(());
    };
    audit::report(ctx.http(), ctx.data(), guild_id, record.with_actor_name(ctx.author().name.clone())).await;

    if let Some(location) = removed.post_location() {
        if let Err(e) = publisher::remove(ctx.http(), location).await {
            warn!(guild_id, build_id = %removed.build_id, error = %e, "Failed to remove build post");
        }
    }
    say_ephemeral(ctx, format!("🗑️ Deleted build **{}**.", removed.name)).await
}

/// List the server's builds
#[poise::command(slash_command, guild_only)]
pub async fn list(
    ctx: Context<'_>,
    #[description = "Only builds for this class or profession"]
    #[autocomplete = "autocomplete_class"]
    class: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(builds) = surface(ctx, ctx.data().builds.list_builds(guild_id).await).await? else {
        return Ok(());
    };
    let filter = match class.as_deref().map(str::parse::<GameClass>).transpose() {
        Ok(filter) => filter,
        Err(e) => return say_ephemeral(ctx, format!("❌ {e}")).await,
    };
    let lines: Vec<String> = builds
        .iter()
        .filter(|b| filter.map_or(true, |f| matches_class(b, f)))
        .map(build_line)
        .collect();
    if lines.is_empty() {
        return say_ephemeral(ctx, "No builds found.").await;
    }

    let body = join_capped(&lines, 1900);
    say_ephemeral(ctx, body).await
}

/// Show a build
#[poise::command(slash_command, guild_only)]
pub async fn show(
    ctx: Context<'_>,
    #[description = "Build"]
    #[autocomplete = "autocomplete_build"]
    build: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(found) = surface(ctx, ctx.data().builds.find_build(guild_id, &build).await).await? else {
        return Ok(());
    };
    ctx.send(poise::CreateReply::default().embed(publisher::build_embed(&found)))
        .await?;
    Ok(())
}

/// Posts the build to the configured channel and records where it went.
/// Returns a note for the confirmation reply.
async fn post_build(ctx: Context<'_>, guild_id: u64, build: &BuildRecord) -> Result<String, Error> {
    let Some(config) = surface(ctx, ctx.data().config.get_config(guild_id).await).await? else {
        return Ok(String::new());
    };
    let Some(channel_id) = config.build_channel_id else {
        return Ok(" No build channel is configured, so it was not posted.".to_string());
    };

    match publisher::publish(ctx.http(), channel_id, build).await {
        Ok(location) => {
            ctx.data()
                .builds
                .set_post_location(guild_id, &build.build_id, Some(location))
                .await?;
            Ok(format!(" Posted in <#{channel_id}>."))
        }
        Err(e) => {
            warn!(guild_id, channel_id, build_id = %build.build_id, error = %e, "Failed to post build");
            Ok(format!(" Posting to <#{channel_id}> failed; check the bot's permissions there."))
        }
    }
}

/// `"none"` clears an optional field; `None` keeps it.
fn merge_optional(new: Option<String>, current: &Option<String>) -> Option<String> {
    match new {
        Some(value) if value.trim().eq_ignore_ascii_case("none") => None,
        Some(value) => Some(value),
        None => current.clone(),
    }
}

fn matches_class(build: &BuildRecord, filter: GameClass) -> bool {
    match filter {
        GameClass::Core(profession) => build.class.profession() == profession,
        elite => build.class == elite,
    }
}

fn build_line(build: &BuildRecord) -> String {
    format!(
        "• **{}** ({}) `{}`",
        build.name,
        build.class.display_with_profession(),
        build.build_id
    )
}

async fn autocomplete_class<'a>(_ctx: Context<'_>, partial: &'a str) -> impl Iterator<Item = String> + 'a {
    let needle = partial.to_lowercase();
    GameClass::all()
        .into_iter()
        .map(|class| class.name().to_string())
        .filter(move |name| name.to_lowercase().starts_with(&needle))
        .take(25)
}

async fn autocomplete_build<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = serenity::AutocompleteChoice> + 'a {
    let matches = match ctx.guild_id() {
        Some(guild_id) => ctx
            .data()
            .builds
            .search(guild_id.get(), partial)
            .await
            .unwrap_or_default(),
        None => Vec::new(),
    };
    matches
        .into_iter()
        .map(|(build_id, name)| serenity::AutocompleteChoice::new(name, build_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(class: &str) -> BuildRecord {
        let now = Utc::now();
        BuildRecord {
            build_id: "power-firebrand".to_string(),
            name: "Power Firebrand".to_string(),
            class: class.parse().expect("known class"),
            chat_code: "[&DQEAAA==]".to_string(),
            url: None,
            description: None,
            created_by: 1,
            created_at: now,
            updated_by: 1,
            updated_at: now,
            channel_id: None,
            message_id: None,
            thread_id: None,
        }
    }

    #[test]
    fn none_clears_optional_fields() {
        let current = Some("https://example.com".to_string());
        assert_eq!(merge_optional(Some(" None ".to_string()), &current), None);
        assert_eq!(merge_optional(None, &current), current);
        assert_eq!(
            merge_optional(Some("https://other.example".to_string()), &current).as_deref(),
            Some("https://other.example")
        );
    }

    #[test]
    fn profession_filter_includes_its_elites() {
        let build = record("Firebrand");
        assert!(matches_class(&build, "Guardian".parse().expect("known class")));
        assert!(matches_class(&build, "firebrand".parse().expect("known class")));
        assert!(!matches_class(&build, "Willbender".parse().expect("known class")));
        assert!(!matches_class(&build, "Necromancer".parse().expect("known class")));
    }
}
