use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Permissions a key needs for every account feature to work. Missing ones
/// are reported but do not block saving.
pub const REQUIRED_PERMISSIONS: [&str; 4] = ["account", "characters", "guilds", "wvw"];

/// A GW2 API key saved by one Discord user in one guild.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiKeyRecord {
    pub name: String,
    pub key: String,
    pub account_name: String,
    pub permissions: Vec<String>,
    pub guild_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKeyRecord {
    /// First and last four characters, enough to tell keys apart.
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.key.chars().collect();
        if chars.len() <= 8 {
            return "****".to_string();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}…{tail}")
    }

    pub fn missing_permissions(&self) -> Vec<&'static str> {
        REQUIRED_PERMISSIONS
            .iter()
            .copied()
            .filter(|required| !self.permissions.iter().any(|p| p == required))
            .collect()
    }
}

/// A stored key together with display labels for its guilds.
#[derive(Debug, Clone)]
pub struct KeySummary {
    pub record: ApiKeyRecord,
    pub guild_labels: Vec<String>,
}

impl KeySummary {
    pub fn from_record(record: ApiKeyRecord, labels: &HashMap<String, String>) -> Self {
        let guild_labels = record
            .guild_ids
            .iter()
            .map(|id| labels.get(id).cloned().unwrap_or_else(|| id.clone()))
            .collect();
        Self {
            record,
            guild_labels,
        }
    }
}

/// `base`, or `base (2)`, `base (3)`... when the name is taken
/// (case-insensitively).
pub fn unique_key_name(base: &str, existing: &[ApiKeyRecord]) -> String {
    let base = if base.trim().is_empty() {
        "Account"
    } else {
        base.trim()
    };
    let taken: Vec<String> = existing.iter().map(|r| r.name.to_lowercase()).collect();
    if !taken.contains(&base.to_lowercase()) {
        return base.to_string();
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{base} ({suffix})");
        if !taken.contains(&candidate.to_lowercase()) {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> ApiKeyRecord {
        ApiKeyRecord {
            name: name.to_string(),
            key: "ABCDEFGH-1234-5678".to_string(),
            account_name: "Tester.1234".to_string(),
            permissions: vec!["account".into(), "guilds".into()],
            guild_ids: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn unique_names_get_numeric_suffix() {
        let existing = vec![record("Tester.1234"), record("tester.1234 (2)")];
        assert_eq!(unique_key_name("Tester.1234", &existing), "Tester.1234 (3)");
        assert_eq!(unique_key_name("Alt.5678", &existing), "Alt.5678");
        assert_eq!(unique_key_name("  ", &[]), "Account");
    }

    #[test]
    fn reports_missing_permissions() {
        assert_eq!(record("x").missing_permissions(), vec!["characters", "wvw"]);
    }

    #[test]
    fn masks_key() {
        assert_eq!(record("x").masked_key(), "ABCD…5678");
    }
}
