// Shared command plumbing: the moderator check and the split between errors a
// member should read and errors the framework should log.

use crate::core::accounts::AccountError;
use crate::core::audit::AuditError;
use crate::core::builds::BuildError;
use crate::core::comps::CompError;
use crate::core::config::ConfigError;
use crate::core::rss::RssError;
use crate::core::update_notes::UpdateNotesError;
use crate::discord::{Context, Error};

pub async fn say_ephemeral(ctx: Context<'_>, text: impl Into<String>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(text.into())
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

pub fn guild_id(ctx: &Context<'_>) -> Result<u64, Error> {
    Ok(ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get())
}

/// Administrators always pass; otherwise the member needs one of the guild's
/// configured moderator roles. Denials are answered here.
pub async fn moderator_check(ctx: Context<'_>) -> Result<bool, Error> {
    let guild_id = guild_id(&ctx)?;
    let Some(member) = ctx.author_member().await else {
        return Ok(false);
    };
    let is_administrator = member
        .permissions
        .is_some_and(|permissions| permissions.administrator());
    let role_ids: Vec<u64> = member.roles.iter().map(|role| role.get()).collect();

    let allowed = ctx
        .data()
        .config
        .is_authorised(guild_id, &role_ids, is_administrator)
        .await?;
    if !allowed {
        say_ephemeral(
            ctx,
            "You need a moderator role (or Administrator) to use this command.",
        )
        .await?;
    }
    Ok(allowed)
}

/// Errors that carry a message meant for the member who ran the command.
/// Anything else is a failure for `on_error` to log.
pub trait UserFacing: std::error::Error + Send + Sync + 'static {
    fn user_message(&self) -> Option<String>;
}

impl UserFacing for ConfigError {
    fn user_message(&self) -> Option<String> {
        match self {
            ConfigError::Store(_) => None,
            other => Some(other.to_string()),
        }
    }
}

impl UserFacing for CompError {
    fn user_message(&self) -> Option<String> {
        match self {
            CompError::Store(_) | CompError::Platform(_) => None,
            other => Some(other.to_string()),
        }
    }
}

impl UserFacing for BuildError {
    fn user_message(&self) -> Option<String> {
        match self {
            BuildError::Store(_) => None,
            other => Some(other.to_string()),
        }
    }
}

impl UserFacing for RssError {
    fn user_message(&self) -> Option<String> {
        match self {
            RssError::Store(_) => None,
            other => Some(other.to_string()),
        }
    }
}

impl UserFacing for AuditError {
    fn user_message(&self) -> Option<String> {
        match self {
            AuditError::Store(_) => None,
            other => Some(other.to_string()),
        }
    }
}

impl UserFacing for AccountError {
    fn user_message(&self) -> Option<String> {
        match self {
            AccountError::Store(_) => None,
            other => Some(other.to_string()),
        }
    }
}

impl UserFacing for UpdateNotesError {
    fn user_message(&self) -> Option<String> {
        match self {
            UpdateNotesError::Store(_) => None,
            other => Some(other.to_string()),
        }
    }
}

/// `Ok(Some(value))` on success. A user-facing error is answered ephemerally
/// and becomes `Ok(None)`; anything else is returned as the command error.
pub async fn surface<T, E: UserFacing>(ctx: Context<'_>, result: Result<T, E>) -> Result<Option<T>, Error> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) => match err.user_message() {
            Some(message) => {
                say_ephemeral(ctx, format!("❌ {message}")).await?;
                Ok(None)
            }
            None => Err(err.into()),
        },
    }
}

/// Discord channel mention, or "Not set".
pub fn channel_label(channel_id: Option<u64>) -> String {
    channel_id
        .map(|id| format!("<#{id}>"))
        .unwrap_or_else(|| "Not set".to_string())
}

/// Joins lines until the next one would push the text past `limit`
/// characters, then marks the cut with "…".
pub fn join_capped(lines: &[String], limit: usize) -> String {
    let mut body = String::new();
    let mut length = 0;
    for line in lines {
        let line_length = line.chars().count() + 1;
        if length + line_length > limit.saturating_sub(1) {
            body.push('…');
            break;
        }
        body.push_str(line);
        body.push('\n');
        length += line_length;
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::StoreError;

    #[test]
    fn storage_failures_are_not_shown_to_members() {
        let err = CompError::Store(StoreError::Database("locked".into()));
        assert_eq!(err.user_message(), None);

        let err = CompError::SlotFull {
            class: "Firebrand".into(),
        };
        assert_eq!(err.user_message().as_deref(), Some("Firebrand is already full."));
    }

    #[test]
    fn join_capped_cuts_at_the_limit() {
        let lines: Vec<String> = (0..10).map(|i| format!("line {i}")).collect();
        assert_eq!(join_capped(&lines[..2], 100), "line 0\nline 1\n");
        let capped = join_capped(&lines, 22);
        assert_eq!(capped, "line 0\nline 1\nline 2\n…");
        assert!(capped.chars().count() <= 22);
    }

    #[test]
    fn channel_label_mentions_or_reports_unset() {
        assert_eq!(channel_label(Some(5)), "<#5>");
        assert_eq!(channel_label(None), "Not set");
    }
}
