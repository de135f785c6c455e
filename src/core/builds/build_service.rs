use super::build_models::{slugify, BuildInput, BuildPostLocation, BuildRecord};
use super::build_store::BuildStore;
use crate::core::audit::AuditRecord;
use crate::core::professions::GameClass;
use crate::core::store::{GuildLocks, StoreError};
use chrono::Utc;
use thiserror::Error;

const AUTOCOMPLETE_LIMIT: usize = 25;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Validation(String),
    #[error("Build not found.")]
    NotFound,
}

/// Validated form of `BuildInput`.
struct CleanInput {
    name: String,
    class: GameClass,
    chat_code: String,
    url: Option<String>,
    description: Option<String>,
}

pub struct BuildService<S: BuildStore> {
    store: S,
    locks: GuildLocks,
}

impl<S: BuildStore> BuildService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: GuildLocks::new(),
        }
    }

    /// Sorted by name.
    pub async fn list_builds(&self, guild_id: u64) -> Result<Vec<BuildRecord>, BuildError> {
        let mut builds = self.store.get_builds(guild_id).await?;
        builds.sort_by_key(|b| b.name.to_lowercase());
        Ok(builds)
    }

    pub async fn find_build(&self, guild_id: u64, build_id: &str) -> Result<BuildRecord, BuildError> {
        self.store
            .get_builds(guild_id)
            .await?
            .into_iter()
            .find(|b| b.build_id == build_id)
            .ok_or(BuildError::NotFound)
    }

    /// `(build_id, name)` pairs whose name or id contains `partial`.
    pub async fn search(&self, guild_id: u64, partial: &str) -> Result<Vec<(String, String)>, BuildError> {
        let needle = partial.to_lowercase();
        Ok(self
            .list_builds(guild_id)
            .await?
            .into_iter()
            .filter(|b| b.name.to_lowercase().contains(&needle) || b.build_id.contains(&needle))
            .take(AUTOCOMPLETE_LIMIT)
            .map(|b| (b.build_id, b.name))
            .collect())
    }

    pub async fn add_build(
        &self,
        guild_id: u64,
        actor_id: u64,
        input: BuildInput,
    ) -> Result<(BuildRecord, AuditRecord), BuildError> {
        let clean = validate(input)?;

        let _guard = self.locks.lock(guild_id).await;
        let mut builds = self.store.get_builds(guild_id).await?;
        let build_id = unique_build_id(&slugify(&clean.name), &builds, None);

        let now = Utc::now();
        let record = BuildRecord {
            build_id,
            name: clean.name,
            class: clean.class,
            chat_code: clean.chat_code,
            url: clean.url,
            description: clean.description,
            created_by: actor_id,
            created_at: now,
            updated_by: actor_id,
            updated_at: now,
            channel_id: None,
            message_id: None,
            thread_id: None,
        };
        builds.push(record.clone());
        self.store.save_builds(guild_id, &builds).await?;

        let audit = AuditRecord::new(
            "build_change",
            format!("Added build **{}** (`{}`)", record.name, record.build_id),
        )
        .with_actor(actor_id);
        Ok((record, audit))
    }

    /// Returns the updated record. A rename re-slugs the id.
    pub async fn edit_build(
        &self,
        guild_id: u64,
        actor_id: u64,
        build_id: &str,
        input: BuildInput,
    ) -> Result<(BuildRecord, AuditRecord), BuildError> {
        let clean = validate(input)?;

        let _guard = self.locks.lock(guild_id).await;
        let mut builds = self.store.get_builds(guild_id).await?;
        let index = builds
            .iter()
            .position(|b| b.build_id == build_id)
            .ok_or(BuildError::NotFound)?;

        let new_id = unique_build_id(&slugify(&clean.name), &builds, Some(build_id));
        let record = &mut builds[index];
        record.build_id = new_id;
        record.name = clean.name;
        record.class = clean.class;
        record.chat_code = clean.chat_code;
        record.url = clean.url;
        record.description = clean.description;
        record.updated_by = actor_id;
        record.updated_at = Utc::now();
        let updated = record.clone();

        self.store.save_builds(guild_id, &builds).await?;

        let audit = AuditRecord::new(
            "build_change",
            format!("Edited build **{}** (`{}`)", updated.name, updated.build_id),
        )
        .with_actor(actor_id);
        Ok((updated, audit))
    }

    /// `confirmation` must match the build name, ignoring case and
    /// surrounding whitespace.
    pub async fn delete_build(
        &self,
        guild_id: u64,
        actor_id: u64,
        build_id: &str,
        confirmation: &str,
    ) -> Result<(BuildRecord, AuditRecord), BuildError> {
        let _guard = self.locks.lock(guild_id).await;
        let mut builds = self.store.get_builds(guild_id).await?;
        let index = builds
            .iter()
            .position(|b| b.build_id == build_id)
            .ok_or(BuildError::NotFound)?;

        if !confirmation.trim().eq_ignore_ascii_case(builds[index].name.trim()) {
            return Err(BuildError::Validation(
                "Confirmation text does not match the build name.".to_string(),
            ));
        }

        let removed = builds.remove(index);
        self.store.save_builds(guild_id, &builds).await?;

        let audit = AuditRecord::new(
            "build_change",
            format!("Deleted build **{}** (`{}`)", removed.name, removed.build_id),
        )
        .with_actor(actor_id);
        Ok((removed, audit))
    }

    /// Remember (or forget, with `None`) where a build's post lives.
    pub async fn set_post_location(
        &self,
        guild_id: u64,
        build_id: &str,
        location: Option<BuildPostLocation>,
    ) -> Result<(), BuildError> {
        let _guard = self.locks.lock(guild_id).await;
        let mut builds = self.store.get_builds(guild_id).await?;
        let record = builds
            .iter_mut()
            .find(|b| b.build_id == build_id)
            .ok_or(BuildError::NotFound)?;

        record.channel_id = location.map(|l| l.channel_id);
        record.message_id = location.map(|l| l.message_id);
        record.thread_id = location.and_then(|l| l.thread_id);
        self.store.save_builds(guild_id, &builds).await?;
        Ok(())
    }
}

fn validate(input: BuildInput) -> Result<CleanInput, BuildError> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(BuildError::Validation("Build name cannot be empty.".to_string()));
    }
    let chat_code = input.chat_code.trim().to_string();
    if chat_code.is_empty() {
        return Err(BuildError::Validation("Chat code cannot be empty.".to_string()));
    }
    let class: GameClass = input
        .class
        .parse()
        .map_err(|_| BuildError::Validation("Unknown class or specialization.".to_string()))?;

    let clean = |value: Option<String>| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    Ok(CleanInput {
        name,
        class,
        chat_code,
        url: clean(input.url),
        description: clean(input.description),
    })
}

/// `base`, then `base-2`, `base-3`... skipping ids already taken.
/// `current` is the id being renamed, which may keep its own slug.
fn unique_build_id(base: &str, builds: &[BuildRecord], current: Option<&str>) -> String {
    let taken = |candidate: &str| {
        builds
            .iter()
            .any(|b| b.build_id == candidate && Some(b.build_id.as_str()) != current)
    };
    if !taken(base) {
        return base.to_string();
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{base}-{suffix}");
        if !taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dashmap::DashMap;

    #[derive(Default)]
    struct MockBuildStore {
        builds: DashMap<u64, Vec<BuildRecord>>,
    }

    #[async_trait]
    impl BuildStore for MockBuildStore {
        async fn get_builds(&self, guild_id: u64) -> Result<Vec<BuildRecord>, StoreError> {
            Ok(self
                .builds
                .get(&guild_id)
                .map(|b| b.clone())
                .unwrap_or_default())
        }

        async fn save_builds(&self, guild_id: u64, builds: &[BuildRecord]) -> Result<(), StoreError> {
            self.builds.insert(guild_id, builds.to_vec());
            Ok(())
        }
    }

    fn input(name: &str, class: &str) -> BuildInput {
        BuildInput {
            name: name.to_string(),
            class: class.to_string(),
            chat_code: "[&DQg1KTIlIjbBEgAAgQB1AUABgQB1AUABlQCVAAAAAAAAAAAAAAAAAAAAAAA=]".to_string(),
            url: Some("  ".to_string()),
            description: Some(" Raid DPS ".to_string()),
        }
    }

    #[tokio::test]
    async fn add_dedupes_slugs() {
        let service = BuildService::new(MockBuildStore::default());
        let (first, audit) = service.add_build(1, 9, input("Power Reaper", "reaper")).await.unwrap();
        let (second, _) = service.add_build(1, 9, input("power reaper!", "Reaper")).await.unwrap();

        assert_eq!(first.build_id, "power-reaper");
        assert_eq!(second.build_id, "power-reaper-2");
        assert_eq!(first.url, None);
        assert_eq!(first.description.as_deref(), Some("Raid DPS"));
        assert_eq!(audit.actor_id, Some(9));
    }

    #[tokio::test]
    async fn unknown_class_is_rejected() {
        let service = BuildService::new(MockBuildStore::default());
        let err = service.add_build(1, 9, input("X", "Bard")).await.unwrap_err();
        assert!(matches!(err, BuildError::Validation(_)));
        assert!(service.list_builds(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn edit_renames_and_keeps_post_location() {
        let service = BuildService::new(MockBuildStore::default());
        let (record, _) = service.add_build(1, 9, input("Heal FB", "Firebrand")).await.unwrap();
        service
            .set_post_location(
                1,
                &record.build_id,
                Some(BuildPostLocation {
                    channel_id: 5,
                    message_id: 6,
                    thread_id: Some(7),
                }),
            )
            .await
            .unwrap();

        let (edited, _) = service
            .edit_build(1, 10, "heal-fb", input("Quickness FB", "Firebrand"))
            .await
            .unwrap();
        assert_eq!(edited.build_id, "quickness-fb");
        assert_eq!(edited.updated_by, 10);
        assert_eq!(edited.created_by, 9);
        assert_eq!(edited.thread_id, Some(7));
        assert!(matches!(
            service.find_build(1, "heal-fb").await.unwrap_err(),
            BuildError::NotFound
        ));
    }

    #[tokio::test]
    async fn editing_without_rename_keeps_id() {
        let service = BuildService::new(MockBuildStore::default());
        service.add_build(1, 9, input("Heal FB", "Firebrand")).await.unwrap();
        let (edited, _) = service
            .edit_build(1, 9, "heal-fb", input("Heal FB", "Guardian"))
            .await
            .unwrap();
        assert_eq!(edited.build_id, "heal-fb");
    }

    #[tokio::test]
    async fn delete_requires_matching_confirmation() {
        let service = BuildService::new(MockBuildStore::default());
        service.add_build(1, 9, input("Heal FB", "Firebrand")).await.unwrap();

        let err = service.delete_build(1, 9, "heal-fb", "nope").await.unwrap_err();
        assert!(matches!(err, BuildError::Validation(_)));

        let (removed, _) = service.delete_build(1, 9, "heal-fb", " heal fb ").await.unwrap();
        assert_eq!(removed.name, "Heal FB");
        assert!(service.list_builds(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_matches_name_fragments() {
        let service = BuildService::new(MockBuildStore::default());
        service.add_build(1, 9, input("Heal FB", "Firebrand")).await.unwrap();
        service.add_build(1, 9, input("Power Reaper", "Reaper")).await.unwrap();

        let found = service.search(1, "REAP").await.unwrap();
        assert_eq!(found, vec![("power-reaper".to_string(), "Power Reaper".to_string())]);
    }
}
