use crate::core::comps::{CompPoster, CompositionView, PostError};
use ::serenity::http::HttpError;
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

// Discord JSON error codes.
const UNKNOWN_CHANNEL: isize = 10003;
const UNKNOWN_MESSAGE: isize = 10008;
const MISSING_ACCESS: isize = 50001;

/// Renders composition views as an embed plus a class select menu.
pub struct SerenityCompPoster {
    http: Arc<serenity::Http>,
}

impl SerenityCompPoster {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

pub fn build_embed(view: &CompositionView) -> serenity::CreateEmbed {
    let mut embed = serenity::CreateEmbed::new()
        .title(&view.title)
        .description(&view.description)
        .color(view.color)
        .footer(serenity::CreateEmbedFooter::new(&view.footer));

    if let Some(overview) = &view.overview {
        embed = embed.field("Overview", overview, false);
    }
    for field in &view.fields {
        embed = embed.field(&field.title, field.render_value(|id| format!("<@{id}>")), true);
    }
    embed
}

pub fn build_components(view: &CompositionView) -> Vec<serenity::CreateActionRow> {
    let options = view
        .options
        .iter()
        .map(|option| {
            serenity::CreateSelectMenuOption::new(&option.label, &option.value).description(&option.description)
        })
        .collect();
    let menu = serenity::CreateSelectMenu::new(&view.custom_id, serenity::CreateSelectMenuKind::String { options })
        .placeholder(&view.placeholder)
        .min_values(1)
        .max_values(1);
    vec![serenity::CreateActionRow::SelectMenu(menu)]
}

/// Missing channels and lost access pause the schedule; a missing message
/// only closes that post.
fn classify(err: serenity::Error, channel_id: u64) -> PostError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &err {
        if let Some(mapped) = classify_response(response.status_code.as_u16(), response.error.code, channel_id) {
            return mapped;
        }
    }
    PostError::Platform(err.to_string())
}

fn classify_response(status: u16, code: isize, channel_id: u64) -> Option<PostError> {
    match (code, status) {
        (UNKNOWN_MESSAGE, _) => Some(PostError::MessageUnavailable),
        (UNKNOWN_CHANNEL | MISSING_ACCESS, _) | (_, 403 | 404) => Some(PostError::ChannelUnavailable(channel_id)),
        _ => None,
    }
}

#[async_trait]
impl CompPoster for SerenityCompPoster {
    async fn send(&self, channel_id: u64, view: &CompositionView) -> Result<u64, PostError> {
        let message = serenity::CreateMessage::new()
            .embed(build_embed(view))
            .components(build_components(view));
        let sent = serenity::ChannelId::new(channel_id)
            .send_message(&self.http, message)
            .await
            .map_err(|e| classify(e, channel_id))?;
        Ok(sent.id.get())
    }

    async fn edit(&self, channel_id: u64, message_id: u64, view: &CompositionView) -> Result<(), PostError> {
        let edit = serenity::EditMessage::new()
            .embed(build_embed(view))
            .components(build_components(view));
        serenity::ChannelId::new(channel_id)
            .edit_message(&self.http, serenity::MessageId::new(message_id), edit)
            .await
            .map_err(|e| classify(e, channel_id))?;
        Ok(())
    }

    async fn retire(&self, channel_id: u64, message_id: u64) -> Result<(), PostError> {
        serenity::ChannelId::new(channel_id)
            .edit_message(
                &self.http,
                serenity::MessageId::new(message_id),
                serenity::EditMessage::new().components(Vec::new()),
            )
            .await
            .map_err(|e| classify(e, channel_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discord_error_codes_map_to_post_errors() {
        // (status, code) pairs as Discord returns them.
        assert_eq!(classify_response(404, 10003, 50), Some(PostError::ChannelUnavailable(50)));
        assert_eq!(classify_response(403, 50001, 50), Some(PostError::ChannelUnavailable(50)));
        assert_eq!(classify_response(404, 10008, 50), Some(PostError::MessageUnavailable));
        assert_eq!(classify_response(403, 50013, 50), Some(PostError::ChannelUnavailable(50)));
        assert_eq!(classify_response(429, 0, 50), None);
        assert_eq!(classify_response(500, 0, 50), None);
    }
}
