// Guild configuration service.
//
// Every mutation runs under the guild lock as load -> modify -> save, and
// returns the AuditRecord describing it so the caller can append it to the
// guild's audit log.

use super::config_models::{normalise_api_key_names, GuildConfig};
use super::config_store::{GuildConfigStore, StoreError};
use crate::core::audit::AuditRecord;
use crate::core::store::GuildLocks;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
}

pub struct ConfigService<S: GuildConfigStore> {
    store: S,
    locks: GuildLocks,
}

impl<S: GuildConfigStore> ConfigService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: GuildLocks::new(),
        }
    }

    pub async fn get_config(&self, guild_id: u64) -> Result<GuildConfig, ConfigError> {
        Ok(self.store.get_config(guild_id).await?)
    }

    pub async fn is_authorised(
        &self,
        guild_id: u64,
        member_role_ids: &[u64],
        is_administrator: bool,
    ) -> Result<bool, ConfigError> {
        if is_administrator {
            return Ok(true);
        }
        let config = self.store.get_config(guild_id).await?;
        Ok(config.is_authorised(member_role_ids, is_administrator))
    }

    pub async fn add_moderator_role(
        &self,
        guild_id: u64,
        actor_id: u64,
        role_id: u64,
    ) -> Result<AuditRecord, ConfigError> {
        self.update(guild_id, |config| {
            if config.moderator_role_ids.contains(&role_id) {
                return Err(ConfigError::Validation(
                    "That role is already a moderator role.".to_string(),
                ));
            }
            config.moderator_role_ids.push(role_id);
            Ok(())
        })
        .await?;

        Ok(AuditRecord::new("config_change", format!("Added moderator role <@&{role_id}>"))
            .with_actor(actor_id)
            .with_target(role_id, None))
    }

    pub async fn remove_moderator_role(
        &self,
        guild_id: u64,
        actor_id: u64,
        role_id: u64,
    ) -> Result<AuditRecord, ConfigError> {
        self.update(guild_id, |config| {
            let before = config.moderator_role_ids.len();
            config.moderator_role_ids.retain(|id| *id != role_id);
            if config.moderator_role_ids.len() == before {
                return Err(ConfigError::NotFound(
                    "That role is not a moderator role.".to_string(),
                ));
            }
            Ok(())
        })
        .await?;

        Ok(AuditRecord::new("config_change", format!("Removed moderator role <@&{role_id}>"))
            .with_actor(actor_id)
            .with_target(role_id, None))
    }

    pub async fn reset_moderator_roles(
        &self,
        guild_id: u64,
        actor_id: u64,
    ) -> Result<AuditRecord, ConfigError> {
        self.update(guild_id, |config| {
            config.moderator_role_ids.clear();
            Ok(())
        })
        .await?;

        Ok(AuditRecord::new("config_change", "Cleared all moderator roles").with_actor(actor_id))
    }

    pub async fn set_build_channel(
        &self,
        guild_id: u64,
        actor_id: u64,
        channel_id: Option<u64>,
    ) -> Result<AuditRecord, ConfigError> {
        self.update(guild_id, |config| {
            config.build_channel_id = channel_id;
            Ok(())
        })
        .await?;

        Ok(channel_record("Build channel", actor_id, channel_id))
    }

    pub async fn set_update_notes_channel(
        &self,
        guild_id: u64,
        actor_id: u64,
        channel_id: Option<u64>,
    ) -> Result<AuditRecord, ConfigError> {
        self.update(guild_id, |config| {
            config.update_notes_channel_id = channel_id;
            Ok(())
        })
        .await?;

        Ok(channel_record("Update notes channel", actor_id, channel_id))
    }

    pub async fn set_audit_channel(
        &self,
        guild_id: u64,
        actor_id: u64,
        channel_id: Option<u64>,
    ) -> Result<AuditRecord, ConfigError> {
        self.update(guild_id, |config| {
            config.audit_channel_id = channel_id;
            Ok(())
        })
        .await?;

        Ok(channel_record("Audit channel", actor_id, channel_id))
    }

    /// Store (or with an empty key, remove) a named GW2 API key used for
    /// guild log syncing. The raw key never appears in the audit summary.
    pub async fn set_audit_gw2_key(
        &self,
        guild_id: u64,
        actor_id: u64,
        name: &str,
        api_key: Option<&str>,
    ) -> Result<AuditRecord, ConfigError> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return Err(ConfigError::Validation("Key name cannot be empty.".to_string()));
        }
        let api_key = api_key.map(str::trim).filter(|key| !key.is_empty());

        let summary = match api_key {
            Some(_) => format!("Saved GW2 audit key `{name}`"),
            None => format!("Removed GW2 audit key `{name}`"),
        };

        self.update(guild_id, |config| {
            let mut keys = std::mem::take(&mut config.audit_gw2_api_keys);
            match api_key {
                Some(key) => {
                    keys.insert(name.clone(), key.to_string());
                }
                None => {
                    if keys.remove(&name).is_none() {
                        config.audit_gw2_api_keys = keys;
                        return Err(ConfigError::NotFound(format!(
                            "No GW2 audit key named `{name}`."
                        )));
                    }
                }
            }
            config.audit_gw2_api_keys = normalise_api_key_names(keys);
            Ok(())
        })
        .await?;

        Ok(AuditRecord::new("config_change", summary).with_actor(actor_id))
    }

    pub async fn set_audit_gw2_guild(
        &self,
        guild_id: u64,
        actor_id: u64,
        gw2_guild_id: Option<&str>,
    ) -> Result<AuditRecord, ConfigError> {
        let cleaned = gw2_guild_id
            .map(|id| id.trim().to_lowercase())
            .filter(|id| !id.is_empty());

        let summary = match &cleaned {
            Some(id) => format!("GW2 audit guild set to `{id}`"),
            None => "GW2 audit guild cleared".to_string(),
        };

        self.update(guild_id, |config| {
            config.audit_gw2_guild_id = cleaned.clone();
            Ok(())
        })
        .await?;

        Ok(AuditRecord::new("config_change", summary).with_actor(actor_id))
    }

    async fn update<F>(&self, guild_id: u64, mutate: F) -> Result<GuildConfig, ConfigError>
    where
        F: FnOnce(&mut GuildConfig) -> Result<(), ConfigError>,
    {
        let _guard = self.locks.lock(guild_id).await;
        let mut config = self.store.get_config(guild_id).await?;
        mutate(&mut config)?;
        self.store.save_config(guild_id, &config).await?;
        Ok(config)
    }
}

fn channel_record(label: &str, actor_id: u64, channel_id: Option<u64>) -> AuditRecord {
    let summary = match channel_id {
        Some(id) => format!("{label} set to <#{id}>"),
        None => format!("{label} cleared"),
    };
    AuditRecord::new("config_change", summary).with_actor(actor_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dashmap::DashMap;

    struct MockConfigStore {
        configs: DashMap<u64, GuildConfig>,
    }

    impl MockConfigStore {
        fn new() -> Self {
            Self {
                configs: DashMap::new(),
            }
        }
    }

    #[async_trait]
    impl GuildConfigStore for MockConfigStore {
        async fn get_config(&self, guild_id: u64) -> Result<GuildConfig, StoreError> {
            Ok(self
                .configs
                .get(&guild_id)
                .map(|c| c.clone())
                .unwrap_or_default())
        }

        async fn save_config(&self, guild_id: u64, config: &GuildConfig) -> Result<(), StoreError> {
            self.configs.insert(guild_id, config.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn adding_duplicate_role_is_rejected() {
        let service = ConfigService::new(MockConfigStore::new());
        service.add_moderator_role(1, 10, 500).await.unwrap();

        let err = service.add_moderator_role(1, 10, 500).await.unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(service.get_config(1).await.unwrap().moderator_role_ids, vec![500]);
    }

    #[tokio::test]
    async fn removing_unknown_role_is_not_found() {
        let service = ConfigService::new(MockConfigStore::new());
        let err = service.remove_moderator_role(1, 10, 500).await.unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[tokio::test]
    async fn moderator_role_grants_authorisation() {
        let service = ConfigService::new(MockConfigStore::new());
        assert!(!service.is_authorised(1, &[500], false).await.unwrap());

        let record = service.add_moderator_role(1, 10, 500).await.unwrap();
        assert_eq!(record.actor_id, Some(10));
        assert!(service.is_authorised(1, &[500], false).await.unwrap());
        assert!(!service.is_authorised(2, &[500], false).await.unwrap());
    }

    #[tokio::test]
    async fn channel_changes_produce_audit_records() {
        let service = ConfigService::new(MockConfigStore::new());
        let record = service.set_build_channel(1, 10, Some(42)).await.unwrap();
        assert!(record.summary.contains("<#42>"));

        let record = service.set_build_channel(1, 10, None).await.unwrap();
        assert_eq!(record.summary, "Build channel cleared");
        assert_eq!(service.get_config(1).await.unwrap().build_channel_id, None);
    }

    #[tokio::test]
    async fn gw2_keys_are_stored_under_normalised_names() {
        let service = ConfigService::new(MockConfigStore::new());
        let record = service
            .set_audit_gw2_key(1, 10, "  Main ", Some(" SECRET "))
            .await
            .unwrap();
        assert!(!record.summary.contains("SECRET"));

        let config = service.get_config(1).await.unwrap();
        assert_eq!(
            config.audit_gw2_api_keys.get("main").map(String::as_str),
            Some("SECRET")
        );

        service.set_audit_gw2_key(1, 10, "MAIN", None).await.unwrap();
        assert!(service.get_config(1).await.unwrap().audit_gw2_api_keys.is_empty());
    }

    #[tokio::test]
    async fn blank_gw2_key_name_is_rejected() {
        let service = ConfigService::new(MockConfigStore::new());
        let err = service
            .set_audit_gw2_key(1, 10, "   ", Some("abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
