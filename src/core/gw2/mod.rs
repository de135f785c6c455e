// Port for the Guild Wars 2 web API. The reqwest implementation lives in
// `infra::gw2`; services take it as a generic so tests can mock it.

pub mod gw2_models;

pub use gw2_models::{AccountInfo, GuildDetails, GuildLogEntry, TokenInfo};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum Gw2ApiError {
    #[error("Failed to reach the Guild Wars 2 API: {0}")]
    Transport(String),
    #[error("Guild Wars 2 API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Unexpected response from {endpoint}: {detail}")]
    Decode { endpoint: String, detail: String },
}

#[async_trait]
pub trait Gw2Api: Send + Sync {
    async fn token_info(&self, api_key: &str) -> Result<TokenInfo, Gw2ApiError>;

    async fn account(&self, api_key: &str) -> Result<AccountInfo, Gw2ApiError>;

    async fn guild_details(
        &self,
        guild_id: &str,
        api_key: Option<&str>,
    ) -> Result<GuildDetails, Gw2ApiError>;

    /// Entries newer than `since`, in the order the API returns them.
    async fn guild_log(
        &self,
        guild_id: &str,
        api_key: &str,
        since: Option<u64>,
    ) -> Result<Vec<GuildLogEntry>, Gw2ApiError>;
}
