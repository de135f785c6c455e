use crate::core::gw2::{AccountInfo, GuildDetails, GuildLogEntry, Gw2Api, Gw2ApiError, TokenInfo};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.guildwars2.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Guild Wars 2 web API client covering the few endpoints the bot reads.
pub struct Gw2ApiClient {
    client: Client,
    base_url: String,
}

impl Gw2ApiClient {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        headers.insert("User-Agent", HeaderValue::from_static("GW2ToolsBot/0.3"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn get(&self, path: &str, api_key: Option<&str>) -> RequestBuilder {
        let request = self.client.get(format!("{}{}", self.base_url, path));
        match api_key {
            Some(key) => request.bearer_auth(key.trim()),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, endpoint: &str, request: RequestBuilder) -> Result<T, Gw2ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| Gw2ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Gw2ApiError::Status {
                status: status.as_u16(),
                body: error_text(&body),
            });
        }

        response.json::<T>().await.map_err(|e| Gw2ApiError::Decode {
            endpoint: endpoint.to_string(),
            detail: e.to_string(),
        })
    }
}

/// The API answers errors with `{"text": "..."}`; fall back to the raw body.
fn error_text(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("text").and_then(|t| t.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl Gw2Api for Gw2ApiClient {
    async fn token_info(&self, api_key: &str) -> Result<TokenInfo, Gw2ApiError> {
        self.send("/v2/tokeninfo", self.get("/v2/tokeninfo", Some(api_key)))
            .await
    }

    async fn account(&self, api_key: &str) -> Result<AccountInfo, Gw2ApiError> {
        self.send("/v2/account", self.get("/v2/account", Some(api_key)))
            .await
    }

    async fn guild_details(&self, guild_id: &str, api_key: Option<&str>) -> Result<GuildDetails, Gw2ApiError> {
        let path = format!("/v2/guild/{guild_id}");
        self.send(&path, self.get(&path, api_key)).await
    }

    async fn guild_log(
        &self,
        guild_id: &str,
        api_key: &str,
        since: Option<u64>,
    ) -> Result<Vec<GuildLogEntry>, Gw2ApiError> {
        let path = format!("/v2/guild/{guild_id}/log");
        let mut request = self.get(&path, Some(api_key));
        if let Some(since) = since {
            request = request.query(&[("since", since)]);
        }
        let values: Vec<serde_json::Value> = self.send(&path, request).await?;
        Ok(values.into_iter().filter_map(GuildLogEntry::from_value).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_text_prefers_api_message() {
        assert_eq!(error_text(r#"{"text":"Invalid access token"}"#), "Invalid access token");
        assert_eq!(error_text("  Bad gateway \n"), "Bad gateway");
    }

    #[test]
    fn base_url_is_normalised() {
        let client = Gw2ApiClient::with_base_url("https://api.example.com/").unwrap();
        assert_eq!(client.base_url, "https://api.example.com");
    }
}
