use crate::core::comps::render::{parse_selection, parse_signup_custom_id};
use crate::core::comps::{CompError, Selection};
use crate::discord::commands::guard::UserFacing;
use crate::discord::Data;
use anyhow::Result;
use poise::serenity_prelude as serenity;

/// Signup dropdown on a composition post. Other components are ignored.
pub async fn handle_component(
    ctx: &serenity::Context,
    data: &Data,
    component: &serenity::ComponentInteraction,
) -> Result<()> {
    if parse_signup_custom_id(&component.data.custom_id).is_none() {
        return Ok(());
    }
    let Some(guild_id) = component.guild_id.map(|id| id.get()) else {
        return Ok(());
    };
    let serenity::ComponentInteractionDataKind::StringSelect { values } = &component.data.kind else {
        return Ok(());
    };
    let Some(selection) = values.first().and_then(|value| parse_selection(value)) else {
        return Ok(());
    };

    // Acknowledge first; the signup edits the post before we can answer.
    component.defer_ephemeral(&ctx.http).await?;

    let message_id = component.message.id.get();
    let user_id = component.user.id.get();
    let result = match selection {
        Selection::Slot(slot) => data.comps.on_select(guild_id, message_id, user_id, slot).await,
        Selection::Leave => data.comps.on_deselect(guild_id, message_id, user_id).await,
    };

    let reply = match result {
        Ok(signup) => signup.message(),
        Err(err) => reply_for_error(guild_id, message_id, err),
    };

    component
        .create_followup(
            &ctx.http,
            serenity::CreateInteractionResponseFollowup::new()
                .content(reply)
                .ephemeral(true),
        )
        .await?;
    Ok(())
}

fn reply_for_error(guild_id: u64, message_id: u64, err: CompError) -> String {
    match err.user_message() {
        Some(message) => format!("❌ {message}"),
        None => {
            tracing::error!(guild_id, message_id, error = %err, "Composition signup failed");
            "❌ Something went wrong saving your signup. Please try again.".to_string()
        }
    }
}
