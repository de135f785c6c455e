use crate::core::professions::GameClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A shared build, stored in the guild's `builds.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub build_id: String,
    pub name: String,
    pub class: GameClass,
    pub chat_code: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub created_by: u64,
    pub created_at: DateTime<Utc>,
    pub updated_by: u64,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub channel_id: Option<u64>,
    #[serde(default)]
    pub message_id: Option<u64>,
    /// Set when the build channel is a forum and the post is its own thread.
    #[serde(default)]
    pub thread_id: Option<u64>,
}

impl BuildRecord {
    pub fn post_location(&self) -> Option<BuildPostLocation> {
        Some(BuildPostLocation {
            channel_id: self.channel_id?,
            message_id: self.message_id?,
            thread_id: self.thread_id,
        })
    }

    pub fn footer(&self) -> String {
        let updater = if self.created_by == self.updated_by {
            "Updated by creator".to_string()
        } else {
            format!("Updated by <@{}>", self.updated_by)
        };
        format!(
            "Created by <@{}> on {} | {} on {}",
            self.created_by,
            self.created_at.format("%m/%d/%y"),
            updater,
            self.updated_at.format("%m/%d/%y")
        )
    }
}

/// Where a build's embed lives in Discord.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildPostLocation {
    pub channel_id: u64,
    pub message_id: u64,
    pub thread_id: Option<u64>,
}

/// Raw moderator input for add/edit, validated by the service.
#[derive(Debug, Clone, Default)]
pub struct BuildInput {
    pub name: String,
    pub class: String,
    pub chat_code: String,
    pub url: Option<String>,
    pub description: Option<String>,
}

/// Lower-case, runs of non-alphanumerics collapsed to `-`.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "build".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Power Reaper (Raid)"), "power-reaper-raid");
        assert_eq!(slugify("  --Heal  FB--  "), "heal-fb");
        assert_eq!(slugify("!!!"), "build");
    }

    #[test]
    fn class_is_stored_by_name() {
        let record = BuildRecord {
            build_id: "x".into(),
            name: "X".into(),
            class: "firebrand".parse().unwrap(),
            chat_code: "[&DQ==]".into(),
            url: None,
            description: None,
            created_by: 1,
            created_at: Utc::now(),
            updated_by: 1,
            updated_at: Utc::now(),
            channel_id: None,
            message_id: None,
            thread_id: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["class"], "Firebrand");
        assert!(record.post_location().is_none());
    }
}
