use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Server-specific configuration, stored as `config.json` in the guild folder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildConfig {
    #[serde(default)]
    pub moderator_role_ids: Vec<u64>,
    #[serde(default)]
    pub build_channel_id: Option<u64>,
    #[serde(default)]
    pub update_notes_channel_id: Option<u64>,
    #[serde(default)]
    pub audit_channel_id: Option<u64>,
    /// Named GW2 API keys used to sync in-game guild logs, keyed by a
    /// normalised (trimmed, lower-case) name.
    #[serde(default)]
    pub audit_gw2_api_keys: BTreeMap<String, String>,
    #[serde(default)]
    pub audit_gw2_guild_id: Option<String>,
}

impl GuildConfig {
    /// Administrators are always authorised; when no moderator roles are
    /// configured only administrators are.
    pub fn is_authorised(&self, member_role_ids: &[u64], is_administrator: bool) -> bool {
        if is_administrator {
            return true;
        }
        member_role_ids
            .iter()
            .any(|role| self.moderator_role_ids.contains(role))
    }
}

/// Trim and lower-case key names, dropping blank names and values.
pub fn normalise_api_key_names(keys: BTreeMap<String, String>) -> BTreeMap<String, String> {
    keys.into_iter()
        .filter_map(|(name, key)| {
            let name = name.trim().to_lowercase();
            let key = key.trim().to_string();
            if name.is_empty() || key.is_empty() {
                None
            } else {
                Some((name, key))
            }
        })
        .collect()
}
