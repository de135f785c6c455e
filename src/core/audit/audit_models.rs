use chrono::{DateTime, Utc};
use serde_json::Value;

const ROW_LIMIT: usize = 1000;

/// One append-only entry in a guild's Discord audit log. Moderator actions
/// (build and config changes) and gateway events (joins, leaves, deletes)
/// share this shape.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub event_type: String,
    pub actor_id: Option<u64>,
    pub actor_name: Option<String>,
    pub target_id: Option<u64>,
    pub target_name: Option<String>,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(event_type: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            actor_id: None,
            actor_name: None,
            target_id: None,
            target_name: None,
            summary: summary.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_actor(mut self, actor_id: u64) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_actor_name(mut self, name: impl Into<String>) -> Self {
        self.actor_name = Some(name.into());
        self
    }

    pub fn with_target(mut self, target_id: u64, target_name: Option<String>) -> Self {
        self.target_id = Some(target_id);
        self.target_name = target_name;
        self
    }

    pub fn title(&self) -> String {
        match self.event_type.as_str() {
            "member_join" => "Member joined".to_string(),
            "member_leave" => "Member left".to_string(),
            "message_delete" => "Message deleted".to_string(),
            "config_change" => "Configuration changed".to_string(),
            "build_change" => "Build changed".to_string(),
            other => title_case(other),
        }
    }

    /// Body posted to the audit channel.
    pub fn channel_message(&self) -> String {
        let actor = self
            .actor_id
            .map(|id| format!("<@{id}>"))
            .or_else(|| self.actor_name.clone());
        match actor {
            Some(actor) => format!("**{}**\n{}\nBy: {}", self.title(), self.summary, actor),
            None => format!("**{}**\n{}", self.title(), self.summary),
        }
    }

    /// Single line used by `/audit recent` and `/audit query`.
    pub fn format_row(&self) -> String {
        let actor = self
            .actor_name
            .clone()
            .or_else(|| self.actor_id.map(|id| id.to_string()))
            .unwrap_or_else(|| "Unknown".to_string());
        let target = self
            .target_name
            .clone()
            .or_else(|| self.target_id.map(|id| id.to_string()))
            .unwrap_or_else(|| "Unknown".to_string());
        truncate(
            &format!(
                "{} | {} | actor: {} | target: {} | {}",
                self.created_at.format("%Y-%m-%d %H:%M:%S"),
                self.event_type,
                actor,
                target,
                self.summary
            ),
            ROW_LIMIT,
        )
    }
}

/// A GW2 guild log entry mirrored into the audit database.
#[derive(Debug, Clone, PartialEq)]
pub struct Gw2AuditEvent {
    pub log_id: Option<u64>,
    pub created_at: String,
    pub event_type: String,
    pub user: Option<String>,
    pub details: Value,
}

impl Gw2AuditEvent {
    pub fn format_row(&self) -> String {
        let user = self.user.as_deref().unwrap_or("Unknown");
        truncate(
            &format!(
                "{} | {} | user: {} | {}",
                self.created_at,
                self.event_type,
                user,
                summarise_payload(&self.details)
            ),
            ROW_LIMIT,
        )
    }
}

/// `key=value` pairs for every field except the ones already shown in the row.
pub fn summarise_payload(payload: &Value) -> String {
    let Some(object) = payload.as_object() else {
        return payload.to_string();
    };
    let parts: Vec<String> = object
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "id" | "time" | "type" | "user"))
        .map(|(key, value)| match value {
            Value::String(s) => format!("{key}={s}"),
            other => format!("{key}={other}"),
        })
        .collect();
    if parts.is_empty() {
        "No extra details".to_string()
    } else {
        parts.join(", ")
    }
}

pub fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn title_case(raw: &str) -> String {
    raw.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_event_types_are_title_cased() {
        let record = AuditRecord::new("member_timeout", "x");
        assert_eq!(record.title(), "Member Timeout");
    }

    #[test]
    fn channel_message_mentions_actor() {
        let record = AuditRecord::new("build_change", "Added build `power-reaper`").with_actor(7);
        assert_eq!(
            record.channel_message(),
            "**Build changed**\nAdded build `power-reaper`\nBy: <@7>"
        );
    }

    #[test]
    fn gw2_summary_skips_common_fields() {
        let payload = json!({"id": 1, "time": "t", "type": "kick", "user": "A.1", "kicked_by": "B.2"});
        assert_eq!(summarise_payload(&payload), "kicked_by=B.2");
        assert_eq!(summarise_payload(&json!({"id": 1})), "No extra details");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "é".repeat(10);
        let cut = truncate(&text, 5);
        assert_eq!(cut.chars().count(), 5);
        assert!(cut.ends_with('…'));
    }
}
