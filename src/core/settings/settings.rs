// Process-level settings read once from the environment at startup.
//
// Guild-scoped settings live in `core::config`; this is only what the
// operator controls (token, production flag, data directory).

use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Settings {
    pub discord_token: String,
    /// Disables the manual test/force commands when true.
    pub production: bool,
    pub data_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let discord_token = lookup("DISCORD_TOKEN").ok_or_else(|| {
            anyhow::anyhow!(
                "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token."
            )
        })?;

        let production = lookup("PRODUCTION")
            .map(|value| parse_flag(&value))
            .unwrap_or(true);

        let data_dir = lookup("GW2TOOLS_DATA_DIR")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));

        Ok(Self {
            discord_token,
            production,
            data_dir,
        })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
