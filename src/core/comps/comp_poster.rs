use super::render::CompositionView;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostError {
    /// The channel was deleted or the bot lost access to it.
    #[error("Channel {0} is unavailable.")]
    ChannelUnavailable(u64),
    #[error("The composition message no longer exists.")]
    MessageUnavailable,
    #[error("Discord error: {0}")]
    Platform(String),
}

/// Where composition messages are rendered. Implemented over serenity's HTTP
/// client in the Discord layer and by a recording mock in tests.
#[async_trait]
pub trait CompPoster: Send + Sync {
    /// Sends a new message and returns its id.
    async fn send(&self, channel_id: u64, view: &CompositionView) -> Result<u64, PostError>;
    async fn edit(&self, channel_id: u64, message_id: u64, view: &CompositionView) -> Result<(), PostError>;
    /// Strips the signup control from a superseded message.
    async fn retire(&self, channel_id: u64, message_id: u64) -> Result<(), PostError>;
}
