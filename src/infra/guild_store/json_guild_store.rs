use crate::core::builds::{BuildRecord, BuildStore};
use crate::core::comps::{CompState, CompStore};
use crate::core::config::{GuildConfig, GuildConfigStore};
use crate::core::rss::{FeedSubscription, RssStore};
use crate::core::store::{GuildLocks, StoreError};
use crate::core::update_notes::{UpdateNotesStatus, UpdateNotesStore};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

const CONFIG_FILE: &str = "config.json";
const BUILDS_FILE: &str = "builds.json";
const RSS_FILE: &str = "rss_feeds.json";
const COMPS_FILE: &str = "comps.json";
const UPDATE_NOTES_FILE: &str = "update_notes.json";

/// Per-guild JSON documents under `<root>/guild_<id>/`.
///
/// Each write goes to a sibling temp file that is then renamed over the
/// target, so a failed write leaves the previous document intact. Writes for
/// one guild are serialized.
pub struct JsonGuildStore {
    root: PathBuf,
    write_locks: GuildLocks,
}

impl JsonGuildStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_locks: GuildLocks::new(),
        }
    }

    pub fn guild_dir(&self, guild_id: u64) -> PathBuf {
        self.root.join(format!("guild_{guild_id}"))
    }

    async fn read<T: DeserializeOwned>(&self, guild_id: u64, file: &str) -> Result<Option<T>, StoreError> {
        let path = self.guild_dir(guild_id).join(file);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn write<T: Serialize + ?Sized>(&self, guild_id: u64, file: &str, value: &T) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(value)?;

        let _guard = self.write_locks.lock(guild_id).await;
        let dir = self.guild_dir(guild_id);
        fs::create_dir_all(&dir).await?;
        let target = dir.join(file);
        let temp = temp_path(&target);
        fs::write(&temp, text).await?;
        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

fn temp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

#[async_trait]
impl GuildConfigStore for JsonGuildStore {
    async fn get_config(&self, guild_id: u64) -> Result<GuildConfig, StoreError> {
        Ok(self.read(guild_id, CONFIG_FILE).await?.unwrap_or_default())
    }

    async fn save_config(&self, guild_id: u64, config: &GuildConfig) -> Result<(), StoreError> {
        self.write(guild_id, CONFIG_FILE, config).await
    }
}

#[async_trait]
impl BuildStore for JsonGuildStore {
    async fn get_builds(&self, guild_id: u64) -> Result<Vec<BuildRecord>, StoreError> {
        Ok(self.read(guild_id, BUILDS_FILE).await?.unwrap_or_default())
    }

    async fn save_builds(&self, guild_id: u64, builds: &[BuildRecord]) -> Result<(), StoreError> {
        self.write(guild_id, BUILDS_FILE, builds).await
    }
}

#[async_trait]
impl RssStore for JsonGuildStore {
    async fn get_feeds(&self, guild_id: u64) -> Result<Vec<FeedSubscription>, StoreError> {
        Ok(self.read(guild_id, RSS_FILE).await?.unwrap_or_default())
    }

    async fn save_feeds(&self, guild_id: u64, feeds: &[FeedSubscription]) -> Result<(), StoreError> {
        self.write(guild_id, RSS_FILE, feeds).await
    }
}

#[async_trait]
impl CompStore for JsonGuildStore {
    async fn load_state(&self, guild_id: u64) -> Result<CompState, StoreError> {
        Ok(self.read(guild_id, COMPS_FILE).await?.unwrap_or_default())
    }

    async fn save_state(&self, guild_id: u64, state: &CompState) -> Result<(), StoreError> {
        self.write(guild_id, COMPS_FILE, state).await
    }
}

#[async_trait]
impl UpdateNotesStore for JsonGuildStore {
    async fn get_status(&self, guild_id: u64) -> Result<Option<UpdateNotesStatus>, StoreError> {
        self.read(guild_id, UPDATE_NOTES_FILE).await
    }

    async fn save_status(&self, guild_id: u64, status: &UpdateNotesStatus) -> Result<(), StoreError> {
        self.write(guild_id, UPDATE_NOTES_FILE, status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::comps::RosterDefinition;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_files_read_as_defaults() {
        let dir = TempDir::new().unwrap();
        let store = JsonGuildStore::new(dir.path());

        assert_eq!(store.get_config(1).await.unwrap(), GuildConfig::default());
        assert!(store.get_builds(1).await.unwrap().is_empty());
        assert!(store.get_feeds(1).await.unwrap().is_empty());
        assert_eq!(store.load_state(1).await.unwrap(), CompState::default());
        assert_eq!(store.get_status(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn documents_round_trip_per_guild() {
        let dir = TempDir::new().unwrap();
        let store = JsonGuildStore::new(dir.path());

        let config = GuildConfig {
            moderator_role_ids: vec![5, 6],
            build_channel_id: Some(7),
            ..Default::default()
        };
        store.save_config(1, &config).await.unwrap();

        let mut state = CompState::default();
        state.next_schedule_id = 3;
        state.presets.push(crate::core::comps::Preset {
            name: "Raid".into(),
            roster: RosterDefinition::parse("Firebrand=2").unwrap(),
            overview: None,
            saved_by: 1,
            saved_at: chrono::Utc::now(),
        });
        store.save_state(1, &state).await.unwrap();

        assert_eq!(store.get_config(1).await.unwrap(), config);
        assert_eq!(store.load_state(1).await.unwrap(), state);
        assert_eq!(store.get_config(2).await.unwrap(), GuildConfig::default());
        assert!(dir.path().join("guild_1").join("comps.json").exists());
        assert!(!dir.path().join("guild_1").join("comps.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_document_is_an_error_and_is_not_overwritten_on_read() {
        let dir = TempDir::new().unwrap();
        let store = JsonGuildStore::new(dir.path());
        let guild_dir = store.guild_dir(1);
        std::fs::create_dir_all(&guild_dir).unwrap();
        std::fs::write(guild_dir.join("builds.json"), "{not json").unwrap();

        assert!(matches!(
            store.get_builds(1).await,
            Err(StoreError::Serialization(_))
        ));
        assert_eq!(
            std::fs::read_to_string(guild_dir.join("builds.json")).unwrap(),
            "{not json"
        );
    }

    #[tokio::test]
    async fn update_notes_status_persists() {
        let dir = TempDir::new().unwrap();
        let store = JsonGuildStore::new(dir.path());
        let status = UpdateNotesStatus {
            last_entry_id: Some("2233".into()),
            last_entry_published_at: None,
        };
        store.save_status(4, &status).await.unwrap();
        assert_eq!(store.get_status(4).await.unwrap(), Some(status));
    }
}
