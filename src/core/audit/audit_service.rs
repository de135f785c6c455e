use super::audit_models::{AuditRecord, Gw2AuditEvent};
use super::audit_store::AuditStore;
use crate::core::gw2::{Gw2Api, Gw2ApiError};
use crate::core::store::StoreError;
use chrono::Utc;
use std::collections::BTreeMap;
use thiserror::Error;

pub const QUERY_LIMIT: u32 = 25;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("GW2 API error: {0}")]
    Fetch(#[from] Gw2ApiError),
    #[error("{0}")]
    Validation(String),
}

pub struct AuditService<C: Gw2Api, S: AuditStore> {
    client: C,
    store: S,
}

impl<C, S> AuditService<C, S>
where
    C: Gw2Api,
    S: AuditStore,
{
    pub fn new(client: C, store: S) -> Self {
        Self { client, store }
    }

    pub async fn record(&self, guild_id: u64, record: &AuditRecord) -> Result<(), AuditError> {
        self.store.add_discord_event(guild_id, record).await?;
        Ok(())
    }

    pub async fn recent(&self, guild_id: u64, limit: u32) -> Result<Vec<AuditRecord>, AuditError> {
        Ok(self.store.recent_discord_events(guild_id, limit).await?)
    }

    /// Search Discord events by mention, raw id, or a name fragment.
    pub async fn query(&self, guild_id: u64, user: &str) -> Result<Vec<AuditRecord>, AuditError> {
        let query = user.trim();
        if query.is_empty() {
            return Err(AuditError::Validation("Provide a user to search for.".to_string()));
        }
        let user_id = parse_user_id(query);
        Ok(self
            .store
            .query_discord_events(guild_id, user_id, query, QUERY_LIMIT)
            .await?)
    }

    pub async fn query_gw2(
        &self,
        guild_id: u64,
        account: &str,
    ) -> Result<Vec<Gw2AuditEvent>, AuditError> {
        let query = account.trim();
        if query.is_empty() {
            return Err(AuditError::Validation(
                "Provide an account name to search for.".to_string(),
            ));
        }
        Ok(self.store.query_gw2_events(guild_id, query, QUERY_LIMIT).await?)
    }

    /// Pull new entries from the GW2 guild log and append them.
    ///
    /// Keys are tried in name order; the first that answers is used. Returns
    /// the number of entries stored.
    pub async fn sync_gw2_log(
        &self,
        guild_id: u64,
        gw2_guild_id: &str,
        api_keys: &BTreeMap<String, String>,
    ) -> Result<usize, AuditError> {
        if api_keys.is_empty() {
            return Err(AuditError::Validation("No GW2 audit keys configured.".to_string()));
        }

        let since = self.store.gw2_last_log_id(guild_id).await?;

        let mut last_error = None;
        let mut entries = None;
        for (name, key) in api_keys {
            match self.client.guild_log(gw2_guild_id, key, since).await {
                Ok(found) => {
                    entries = Some(found);
                    break;
                }
                Err(err) => {
                    tracing::debug!(guild_id, key_name = %name, "GW2 guild log key failed: {err}");
                    last_error = Some(err);
                }
            }
        }

        let entries = match (entries, last_error) {
            (Some(entries), _) => entries,
            (None, Some(err)) => return Err(err.into()),
            (None, None) => Vec::new(),
        };

        let mut max_log_id = since;
        let mut stored = 0;
        // The API returns newest first; store oldest first.
        for entry in entries.into_iter().rev() {
            if since.is_some_and(|last| entry.id <= last) {
                continue;
            }
            max_log_id = Some(max_log_id.map_or(entry.id, |current| current.max(entry.id)));
            let event = Gw2AuditEvent {
                log_id: Some(entry.id),
                created_at: entry.time.unwrap_or_else(|| Utc::now().to_rfc3339()),
                event_type: entry.kind,
                user: entry.user,
                details: entry.payload,
            };
            self.store.add_gw2_event(guild_id, &event).await?;
            stored += 1;
        }

        self.store
            .set_gw2_last_log_id(guild_id, max_log_id, Utc::now())
            .await?;
        Ok(stored)
    }
}

/// `<@123>`, `<@!123>` or a bare numeric id.
pub fn parse_user_id(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|rest| rest.trim_start_matches('!'))
        .unwrap_or(trimmed);
    if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()) {
        inner.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gw2::{AccountInfo, GuildDetails, GuildLogEntry, TokenInfo};
    use async_trait::async_trait;
    use chrono::DateTime;
    use dashmap::DashMap;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockAuditStore {
        discord: DashMap<u64, Vec<AuditRecord>>,
        gw2: DashMap<u64, Vec<Gw2AuditEvent>>,
        last_ids: DashMap<u64, Option<u64>>,
    }

    #[async_trait]
    impl AuditStore for MockAuditStore {
        async fn add_discord_event(
            &self,
            guild_id: u64,
            record: &AuditRecord,
        ) -> Result<(), StoreError> {
            self.discord.entry(guild_id).or_default().push(record.clone());
            Ok(())
        }

        async fn recent_discord_events(
            &self,
            guild_id: u64,
            limit: u32,
        ) -> Result<Vec<AuditRecord>, StoreError> {
            Ok(self
                .discord
                .get(&guild_id)
                .map(|rows| rows.iter().rev().take(limit as usize).cloned().collect())
                .unwrap_or_default())
        }

        async fn query_discord_events(
            &self,
            guild_id: u64,
            user_id: Option<u64>,
            user_query: &str,
            limit: u32,
        ) -> Result<Vec<AuditRecord>, StoreError> {
            let needle = user_query.to_lowercase();
            Ok(self
                .discord
                .get(&guild_id)
                .map(|rows| {
                    rows.iter()
                        .rev()
                        .filter(|r| {
                            user_id.is_some_and(|id| r.actor_id == Some(id) || r.target_id == Some(id))
                                || r.target_name
                                    .as_deref()
                                    .is_some_and(|n| n.to_lowercase().contains(&needle))
                        })
                        .take(limit as usize)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn add_gw2_event(
            &self,
            guild_id: u64,
            event: &Gw2AuditEvent,
        ) -> Result<(), StoreError> {
            self.gw2.entry(guild_id).or_default().push(event.clone());
            Ok(())
        }

        async fn query_gw2_events(
            &self,
            guild_id: u64,
            user_query: &str,
            _limit: u32,
        ) -> Result<Vec<Gw2AuditEvent>, StoreError> {
            Ok(self
                .gw2
                .get(&guild_id)
                .map(|rows| {
                    rows.iter()
                        .filter(|e| e.user.as_deref() == Some(user_query))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn gw2_last_log_id(&self, guild_id: u64) -> Result<Option<u64>, StoreError> {
            Ok(self.last_ids.get(&guild_id).and_then(|id| *id))
        }

        async fn set_gw2_last_log_id(
            &self,
            guild_id: u64,
            log_id: Option<u64>,
            _synced_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.last_ids.insert(guild_id, log_id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockGw2 {
        log: Vec<serde_json::Value>,
        rejected_keys: Vec<String>,
        seen_since: Mutex<Vec<Option<u64>>>,
    }

    #[async_trait]
    impl Gw2Api for MockGw2 {
        async fn token_info(&self, _api_key: &str) -> Result<TokenInfo, Gw2ApiError> {
            unimplemented!()
        }

        async fn account(&self, _api_key: &str) -> Result<AccountInfo, Gw2ApiError> {
            unimplemented!()
        }

        async fn guild_details(
            &self,
            _guild_id: &str,
            _api_key: Option<&str>,
        ) -> Result<GuildDetails, Gw2ApiError> {
            unimplemented!()
        }

        async fn guild_log(
            &self,
            _guild_id: &str,
            api_key: &str,
            since: Option<u64>,
        ) -> Result<Vec<GuildLogEntry>, Gw2ApiError> {
            if self.rejected_keys.iter().any(|k| k == api_key) {
                return Err(Gw2ApiError::Status {
                    status: 403,
                    body: "invalid key".into(),
                });
            }
            self.seen_since.lock().unwrap().push(since);
            Ok(self
                .log
                .iter()
                .cloned()
                .filter_map(GuildLogEntry::from_value)
                .filter(|e| since.map_or(true, |s| e.id > s))
                .collect())
        }
    }

    fn keys(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_mentions_and_ids() {
        assert_eq!(parse_user_id("<@123>"), Some(123));
        assert_eq!(parse_user_id("<@!456>"), Some(456));
        assert_eq!(parse_user_id(" 789 "), Some(789));
        assert_eq!(parse_user_id("someone"), None);
    }

    #[tokio::test]
    async fn sync_stores_new_entries_oldest_first_and_advances_watermark() {
        let client = MockGw2 {
            log: vec![
                json!({"id": 12, "time": "2024-05-02T00:00:00Z", "type": "kick", "user": "B.2"}),
                json!({"id": 11, "time": "2024-05-01T00:00:00Z", "type": "joined", "user": "A.1"}),
            ],
            ..Default::default()
        };
        let service = AuditService::new(client, MockAuditStore::default());

        let stored = service
            .sync_gw2_log(1, "guild", &keys(&[("main", "KEY")]))
            .await
            .unwrap();
        assert_eq!(stored, 2);
        assert_eq!(service.store.gw2_last_log_id(1).await.unwrap(), Some(12));
        let events = service.store.gw2.get(&1).unwrap().clone();
        assert_eq!(events[0].log_id, Some(11));
        assert_eq!(events[1].log_id, Some(12));

        let stored = service
            .sync_gw2_log(1, "guild", &keys(&[("main", "KEY")]))
            .await
            .unwrap();
        assert_eq!(stored, 0);
        assert_eq!(
            *service.client.seen_since.lock().unwrap(),
            vec![None, Some(12)]
        );
    }

    #[tokio::test]
    async fn sync_falls_back_to_next_key() {
        let client = MockGw2 {
            log: vec![json!({"id": 1, "type": "joined", "user": "A.1"})],
            rejected_keys: vec!["BAD".into()],
            ..Default::default()
        };
        let service = AuditService::new(client, MockAuditStore::default());

        let stored = service
            .sync_gw2_log(1, "guild", &keys(&[("a", "BAD"), ("b", "GOOD")]))
            .await
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn sync_reports_fetch_error_when_every_key_fails() {
        let client = MockGw2 {
            rejected_keys: vec!["BAD".into()],
            ..Default::default()
        };
        let service = AuditService::new(client, MockAuditStore::default());

        let err = service
            .sync_gw2_log(1, "guild", &keys(&[("a", "BAD")]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Fetch(_)));
        assert_eq!(service.store.gw2_last_log_id(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn query_matches_mentions() {
        let service = AuditService::new(MockGw2::default(), MockAuditStore::default());
        service
            .record(1, &AuditRecord::new("member_join", "joined").with_target(55, Some("Tester".into())))
            .await
            .unwrap();

        assert_eq!(service.query(1, "<@55>").await.unwrap().len(), 1);
        assert_eq!(service.query(1, "test").await.unwrap().len(), 1);
        assert!(service.query(1, "nobody").await.unwrap().is_empty());
        assert!(matches!(
            service.query(1, "  ").await.unwrap_err(),
            AuditError::Validation(_)
        ));
    }
}
