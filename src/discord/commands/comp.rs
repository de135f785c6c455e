// Composition schedules and roster presets.

use crate::core::comps::{CompositionSchedule, Preset, RosterDefinition, ScheduleInput, ScheduleUpdate};
use crate::discord::commands::guard::{guild_id, join_capped, moderator_check, say_ephemeral, surface};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Organise composition signups
#[poise::command(slash_command, guild_only, subcommands("schedule", "preset"))]
pub async fn comp(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Manage composition schedules
#[poise::command(
    slash_command,
    guild_only,
    subcommands(
        "schedule_create",
        "schedule_edit",
        "schedule_roster",
        "schedule_overview",
        "schedule_apply",
        "schedule_post",
        "schedule_resume",
        "schedule_delete",
        "schedule_list",
        "schedule_show"
    )
)]
pub async fn schedule(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Manage roster presets
#[poise::command(
    slash_command,
    guild_only,
    subcommands("preset_save", "preset_save_from", "preset_show", "preset_delete", "preset_list")
)]
pub async fn preset(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Create a new signup schedule
#[poise::command(slash_command, guild_only, rename = "create", check = "moderator_check")]
pub async fn schedule_create(
    ctx: Context<'_>,
    #[description = "Schedule name"] name: String,
    #[description = "Channel the signup is posted to"]
    #[channel_types("Text", "News")]
    channel: serenity::GuildChannel,
    #[description = "Days, e.g. \"fri\", \"mon,wed\", \"weekends\" or \"daily\""] days: String,
    #[description = "Local time, e.g. 20:00 or 8:30pm"] time: String,
    #[description = "Timezone, e.g. Europe/Berlin or PT"] timezone: String,
    #[description = "Repeat every week (default: yes)"] repeat: Option<bool>,
    #[description = "Preset to start from"]
    #[autocomplete = "autocomplete_preset"]
    preset: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let input = ScheduleInput {
        name,
        channel_id: channel.id.get(),
        days,
        time,
        timezone,
        repeat: repeat.unwrap_or(true),
        preset,
    };
    let Some(schedule) = surface(ctx, ctx.data().comps.create_schedule(guild_id, input).await).await? else {
        return Ok(());
    };
    let mut reply = format!("✅ Created schedule **{}**.", schedule.name);
    if schedule.roster.is_empty() {
        reply.push_str(" Add classes with `/comp schedule roster` before it fires.");
    }
    reply_schedule(ctx, reply, &schedule).await
}

/// Change a schedule's name, channel or timing
#[poise::command(slash_command, guild_only, rename = "edit", check = "moderator_check")]
pub async fn schedule_edit(
    ctx: Context<'_>,
    #[description = "Schedule"]
    #[autocomplete = "autocomplete_schedule"]
    schedule: String,
    #[description = "New name"] name: Option<String>,
    #[description = "New channel"]
    #[channel_types("Text", "News")]
    channel: Option<serenity::GuildChannel>,
    #[description = "New days"] days: Option<String>,
    #[description = "New local time"] time: Option<String>,
    #[description = "New timezone"] timezone: Option<String>,
    #[description = "Repeat every week"] repeat: Option<bool>,
    #[description = "Enable or pause the schedule"] active: Option<bool>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(schedule_id) = resolve_schedule(ctx, guild_id, &schedule).await? else {
        return Ok(());
    };
    let update = ScheduleUpdate {
        name,
        channel_id: channel.map(|c| c.id.get()),
        days,
        time,
        timezone,
        repeat,
        active,
    };
    let result = ctx.data().comps.update_schedule(guild_id, schedule_id, update).await;
    let Some(updated) = surface(ctx, result).await? else {
        return Ok(());
    };
    reply_schedule(ctx, format!("✅ Updated **{}**.", updated.name), &updated).await
}

/// Replace a schedule's roster
#[poise::command(slash_command, guild_only, rename = "roster", check = "moderator_check")]
pub async fn schedule_roster(
    ctx: Context<'_>,
    #[description = "Schedule"]
    #[autocomplete = "autocomplete_schedule"]
    schedule: String,
    #[description = "Classes, e.g. \"Firebrand=2, Scourge=2, Chronomancer\""] classes: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(schedule_id) = resolve_schedule(ctx, guild_id, &schedule).await? else {
        return Ok(());
    };
    let result = ctx
        .data()
        .comps
        .set_roster(guild_id, schedule_id, &roster_lines(&classes))
        .await;
    let Some(updated) = surface(ctx, result).await? else {
        return Ok(());
    };
    reply_schedule(ctx, format!("✅ Roster for **{}** updated.", updated.name), &updated).await
}

/// Set or clear a schedule's overview text
#[poise::command(slash_command, guild_only, rename = "overview", check = "moderator_check")]
pub async fn schedule_overview(
    ctx: Context<'_>,
    #[description = "Schedule"]
    #[autocomplete = "autocomplete_schedule"]
    schedule: String,
    #[description = "Overview shown above the slots (leave empty to clear)"] overview: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(schedule_id) = resolve_schedule(ctx, guild_id, &schedule).await? else {
        return Ok(());
    };
    let result = ctx.data().comps.set_overview(guild_id, schedule_id, overview).await;
    let Some(updated) = surface(ctx, result).await? else {
        return Ok(());
    };
    reply_schedule(ctx, format!("✅ Overview for **{}** updated.", updated.name), &updated).await
}

/// Copy a preset's roster and overview onto a schedule
#[poise::command(slash_command, guild_only, rename = "apply", check = "moderator_check")]
pub async fn schedule_apply(
    ctx: Context<'_>,
    #[description = "Schedule"]
    #[autocomplete = "autocomplete_schedule"]
    schedule: String,
    #[description = "Preset"]
    #[autocomplete = "autocomplete_preset"]
    preset: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(schedule_id) = resolve_schedule(ctx, guild_id, &schedule).await? else {
        return Ok(());
    };
    let result = ctx.data().comps.apply_preset(guild_id, schedule_id, &preset).await;
    let Some(updated) = surface(ctx, result).await? else {
        return Ok(());
    };
    reply_schedule(
        ctx,
        format!(
            "✅ **{}** now uses preset **{}**.",
            updated.name,
            updated.active_preset.as_deref().unwrap_or(&preset)
        ),
        &updated,
    )
    .await
}

/// Post a signup for a schedule right now
#[poise::command(slash_command, guild_only, rename = "post_now", check = "moderator_check")]
pub async fn schedule_post(
    ctx: Context<'_>,
    #[description = "Schedule"]
    #[autocomplete = "autocomplete_schedule"]
    schedule: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(schedule_id) = resolve_schedule(ctx, guild_id, &schedule).await? else {
        return Ok(());
    };
    ctx.defer_ephemeral().await?;
    let Some(post) = surface(ctx, ctx.data().comps.post(guild_id, schedule_id).await).await? else {
        return Ok(());
    };
    say_ephemeral(
        ctx,
        format!(
            "✅ Posted: https://discord.com/channels/{}/{}/{}",
            guild_id, post.channel_id, post.message_id
        ),
    )
    .await
}

/// Resume a schedule that was paused because its channel failed
#[poise::command(slash_command, guild_only, rename = "resume", check = "moderator_check")]
pub async fn schedule_resume(
    ctx: Context<'_>,
    #[description = "Schedule"]
    #[autocomplete = "autocomplete_schedule"]
    schedule: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(schedule_id) = resolve_schedule(ctx, guild_id, &schedule).await? else {
        return Ok(());
    };
    let result = ctx.data().comps.clear_attention(guild_id, schedule_id).await;
    let Some(updated) = surface(ctx, result).await? else {
        return Ok(());
    };
    reply_schedule(ctx, format!("✅ **{}** will fire again.", updated.name), &updated).await
}

/// Delete a schedule and close its live signup
#[poise::command(slash_command, guild_only, rename = "delete", check = "moderator_check")]
pub async fn schedule_delete(
    ctx: Context<'_>,
    #[description = "Schedule"]
    #[autocomplete = "autocomplete_schedule"]
    schedule: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(schedule_id) = resolve_schedule(ctx, guild_id, &schedule).await? else {
        return Ok(());
    };
    let Some(removed) = surface(ctx, ctx.data().comps.delete_schedule(guild_id, schedule_id).await).await? else {
        return Ok(());
    };
    say_ephemeral(ctx, format!("🗑️ Deleted schedule **{}**.", removed.name)).await
}

/// List this server's schedules
#[poise::command(slash_command, guild_only, rename = "list", check = "moderator_check")]
pub async fn schedule_list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(schedules) = surface(ctx, ctx.data().comps.list_schedules(guild_id).await).await? else {
        return Ok(());
    };
    if schedules.is_empty() {
        return say_ephemeral(ctx, "No schedules yet. Create one with `/comp schedule create`.").await;
    }
    let lines: Vec<String> = schedules.iter().map(schedule_line).collect();
    say_ephemeral(ctx, join_capped(&lines, 1900)).await
}

/// Show a schedule's settings and roster
#[poise::command(slash_command, guild_only, rename = "show", check = "moderator_check")]
pub async fn schedule_show(
    ctx: Context<'_>,
    #[description = "Schedule"]
    #[autocomplete = "autocomplete_schedule"]
    schedule: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(schedule_id) = resolve_schedule(ctx, guild_id, &schedule).await? else {
        return Ok(());
    };
    let Some(schedules) = surface(ctx, ctx.data().comps.list_schedules(guild_id).await).await? else {
        return Ok(());
    };
    match schedules.iter().find(|s| s.id == schedule_id) {
        Some(found) => reply_schedule(ctx, String::new(), found).await,
        None => say_ephemeral(ctx, "❌ Schedule not found.").await,
    }
}

/// Save a preset from a class list
#[poise::command(slash_command, guild_only, rename = "save", check = "moderator_check")]
pub async fn preset_save(
    ctx: Context<'_>,
    #[description = "Preset name"] name: String,
    #[description = "Classes, e.g. \"Firebrand=2, Scourge=2, Chronomancer\""] classes: String,
    #[description = "Overview text"] overview: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let result = ctx
        .data()
        .comps
        .save_preset(guild_id, ctx.author().id.get(), &name, &roster_lines(&classes), overview)
        .await;
    let Some(saved) = surface(ctx, result).await? else {
        return Ok(());
    };
    reply_preset(ctx, format!("✅ Saved preset **{}**.", saved.name), &saved).await
}

/// Save a schedule's current roster as a preset
#[poise::command(slash_command, guild_only, rename = "save_from", check = "moderator_check")]
pub async fn preset_save_from(
    ctx: Context<'_>,
    #[description = "Preset name"] name: String,
    #[description = "Schedule to copy"]
    #[autocomplete = "autocomplete_schedule"]
    schedule: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(schedule_id) = resolve_schedule(ctx, guild_id, &schedule).await? else {
        return Ok(());
    };
    let result = ctx
        .data()
        .comps
        .save_preset_from_schedule(guild_id, ctx.author().id.get(), &name, schedule_id)
        .await;
    let Some(saved) = surface(ctx, result).await? else {
        return Ok(());
    };
    reply_preset(ctx, format!("✅ Saved preset **{}**.", saved.name), &saved).await
}

/// Show a preset
#[poise::command(slash_command, guild_only, rename = "show", check = "moderator_check")]
pub async fn preset_show(
    ctx: Context<'_>,
    #[description = "Preset"]
    #[autocomplete = "autocomplete_preset"]
    name: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(found) = surface(ctx, ctx.data().comps.load_preset(guild_id, &name).await).await? else {
        return Ok(());
    };
    reply_preset(ctx, String::new(), &found).await
}

/// Delete a preset
#[poise::command(slash_command, guild_only, rename = "delete", check = "moderator_check")]
pub async fn preset_delete(
    ctx: Context<'_>,
    #[description = "Preset"]
    #[autocomplete = "autocomplete_preset"]
    name: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(removed) = surface(ctx, ctx.data().comps.delete_preset(guild_id, &name).await).await? else {
        return Ok(());
    };
    say_ephemeral(ctx, format!("🗑️ Deleted preset **{}**.", removed.name)).await
}

/// List saved presets
#[poise::command(slash_command, guild_only, rename = "list", check = "moderator_check")]
pub async fn preset_list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(presets) = surface(ctx, ctx.data().comps.list_presets(guild_id).await).await? else {
        return Ok(());
    };
    if presets.is_empty() {
        return say_ephemeral(ctx, "No presets saved yet.").await;
    }
    let lines: Vec<String> = presets
        .iter()
        .map(|p| format!("• **{}** ({} classes)", p.name, p.roster.len()))
        .collect();
    say_ephemeral(ctx, join_capped(&lines, 1900)).await
}

/// Slash options are single-line, so roster entries are comma or semicolon
/// separated there.
fn roster_lines(raw: &str) -> String {
    raw.split([',', ';', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn roster_inline(roster: &RosterDefinition) -> String {
    if roster.is_empty() {
        return "Not set".to_string();
    }
    roster.to_string().replace('\n', ", ")
}

fn schedule_line(schedule: &CompositionSchedule) -> String {
    let status = if schedule.attention.is_some() {
        "⚠️"
    } else if schedule.active {
        "🟢"
    } else {
        "⏸️"
    };
    let next = schedule
        .next_fire_at
        .map(|at| format!("<t:{}:R>", at.timestamp()))
        .unwrap_or_else(|| "not scheduled".to_string());
    format!(
        "{status} **{}** in <#{}>: {} at {} {} (next {next})",
        schedule.name,
        schedule.channel_id,
        schedule.days_label(),
        schedule.time_of_day.format("%H:%M"),
        schedule.timezone
    )
}

async fn reply_schedule(ctx: Context<'_>, content: String, schedule: &CompositionSchedule) -> Result<(), Error> {
    let next = schedule
        .next_fire_at
        .map(|at| format!("<t:{0}:F> (<t:{0}:R>)", at.timestamp()))
        .unwrap_or_else(|| "Not scheduled".to_string());
    let mut embed = serenity::CreateEmbed::new()
        .title(&schedule.name)
        .color(0x2ecc71)
        .field("Channel", format!("<#{}>", schedule.channel_id), true)
        .field("Days", schedule.days_label(), true)
        .field(
            "Time",
            format!("{} {}", schedule.time_of_day.format("%H:%M"), schedule.timezone),
            true,
        )
        .field("Repeats", if schedule.repeat { "Weekly" } else { "Once" }, true)
        .field("Active", if schedule.active { "Yes" } else { "No" }, true)
        .field("Next signup", next, true)
        .field("Roster", roster_inline(&schedule.roster), false);
    if let Some(preset) = &schedule.active_preset {
        embed = embed.field("Preset", preset, true);
    }
    if let Some(overview) = &schedule.overview {
        embed = embed.field("Overview", overview, false);
    }
    if let Some(attention) = &schedule.attention {
        embed = embed.field(
            "⚠️ Needs attention",
            format!("{attention} Change the channel or use `/comp schedule resume`."),
            false,
        );
    }

    let mut reply = poise::CreateReply::default().embed(embed).ephemeral(true);
    if !content.is_empty() {
        reply = reply.content(content);
    }
    ctx.send(reply).await?;
    Ok(())
}

async fn reply_preset(ctx: Context<'_>, content: String, preset: &Preset) -> Result<(), Error> {
    let mut embed = serenity::CreateEmbed::new()
        .title(&preset.name)
        .color(0x9b59b6)
        .field("Roster", roster_inline(&preset.roster), false)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Saved {}",
            preset.saved_at.format("%Y-%m-%d %H:%M UTC")
        )));
    if let Some(overview) = &preset.overview {
        embed = embed.field("Overview", overview, false);
    }
    let mut reply = poise::CreateReply::default().embed(embed).ephemeral(true);
    if !content.is_empty() {
        reply = reply.content(content);
    }
    ctx.send(reply).await?;
    Ok(())
}

async fn resolve_schedule(ctx: Context<'_>, guild_id: u64, name: &str) -> Result<Option<u32>, Error> {
    surface(ctx, ctx.data().comps.schedule_id_by_name(guild_id, name).await).await
}

async fn autocomplete_schedule<'a>(ctx: Context<'_>, partial: &'a str) -> impl Iterator<Item = String> + 'a {
    let names = match ctx.guild_id() {
        Some(guild_id) => ctx
            .data()
            .comps
            .search_schedules(guild_id.get(), partial)
            .await
            .unwrap_or_default(),
        None => Vec::new(),
    };
    names.into_iter()
}

async fn autocomplete_preset<'a>(ctx: Context<'_>, partial: &'a str) -> impl Iterator<Item = String> + 'a {
    let names = match ctx.guild_id() {
        Some(guild_id) => ctx
            .data()
            .comps
            .search_presets(guild_id.get(), partial)
            .await
            .unwrap_or_default(),
        None => Vec::new(),
    };
    names.into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_lines_splits_on_commas_and_semicolons() {
        assert_eq!(
            roster_lines("Firebrand=2, Scourge=2; Chronomancer ,,"),
            "Firebrand=2\nScourge=2\nChronomancer"
        );
    }

    #[test]
    fn roster_lines_output_parses() {
        let roster = RosterDefinition::parse(&roster_lines("Firebrand=2, Scourge")).expect("valid roster");
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.slots[0].capacity, Some(2));
        assert_eq!(roster_inline(&roster), "Firebrand=2, Scourge");
    }

    #[test]
    fn empty_roster_is_labelled() {
        assert_eq!(roster_inline(&RosterDefinition::default()), "Not set");
    }
}
