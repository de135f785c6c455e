use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub name: String,
    #[serde(default)]
    pub guilds: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuildDetails {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tag: Option<String>,
}

impl GuildDetails {
    /// "Name [TAG]" or just the name.
    pub fn label(&self) -> String {
        match &self.tag {
            Some(tag) if !tag.is_empty() => format!("{} [{}]", self.name, tag),
            _ => self.name.clone(),
        }
    }
}

/// One row of `/v2/guild/:id/log`. Only the common fields are typed; the full
/// payload is kept for display and storage.
#[derive(Debug, Clone)]
pub struct GuildLogEntry {
    pub id: u64,
    pub time: Option<String>,
    pub kind: String,
    pub user: Option<String>,
    pub payload: serde_json::Value,
}

impl GuildLogEntry {
    pub fn from_value(payload: serde_json::Value) -> Option<Self> {
        let id = payload.get("id")?.as_u64()?;
        let time = payload
            .get("time")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let kind = payload
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let user = payload
            .get("user")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Some(Self {
            id,
            time,
            kind,
            user,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn guild_label_includes_tag() {
        let details = GuildDetails {
            id: "abc".into(),
            name: "Tyrian Explorers".into(),
            tag: Some("TE".into()),
        };
        assert_eq!(details.label(), "Tyrian Explorers [TE]");
    }

    #[test]
    fn log_entry_requires_numeric_id() {
        assert!(GuildLogEntry::from_value(json!({"type": "joined"})).is_none());

        let entry = GuildLogEntry::from_value(json!({
            "id": 42,
            "time": "2024-05-01T10:00:00Z",
            "type": "joined",
            "user": "Someone.1234"
        }))
        .unwrap();
        assert_eq!(entry.id, 42);
        assert_eq!(entry.kind, "joined");
        assert_eq!(entry.user.as_deref(), Some("Someone.1234"));
    }
}
