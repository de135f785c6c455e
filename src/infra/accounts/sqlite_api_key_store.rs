use crate::core::accounts::{ApiKeyRecord, ApiKeyStore};
use crate::core::gw2::GuildDetails;
use crate::core::store::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;
use std::path::Path;

pub struct SqliteApiKeyStore {
    pool: Pool<Sqlite>,
}

fn db(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

impl SqliteApiKeyStore {
    pub async fn new(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS api_keys (
                guild_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                name_key TEXT NOT NULL,
                api_key TEXT NOT NULL,
                account_name TEXT NOT NULL DEFAULT '',
                permissions TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (guild_id, user_id, name_key)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS api_key_guilds (
                guild_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                name_key TEXT NOT NULL,
                gw2_guild_id TEXT NOT NULL,
                PRIMARY KEY (guild_id, user_id, name_key, gw2_guild_id),
                FOREIGN KEY (guild_id, user_id, name_key)
                    REFERENCES api_keys (guild_id, user_id, name_key) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS guild_details (
                gw2_guild_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                tag TEXT,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn guilds_by_key(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<HashMap<String, Vec<String>>, StoreError> {
        let rows = sqlx::query(
            "SELECT name_key, gw2_guild_id FROM api_key_guilds
             WHERE guild_id = ? AND user_id = ? ORDER BY rowid",
        )
        .bind(guild_id as i64)
        .bind(user_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.get("name_key"))
                .or_default()
                .push(row.get("gw2_guild_id"));
        }
        Ok(grouped)
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow, guild_ids: Vec<String>) -> Result<ApiKeyRecord, StoreError> {
    let permissions: String = row.get("permissions");
    Ok(ApiKeyRecord {
        name: row.get("name"),
        key: row.get("api_key"),
        account_name: row.get("account_name"),
        permissions: serde_json::from_str(&permissions)?,
        guild_ids,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

#[async_trait]
impl ApiKeyStore for SqliteApiKeyStore {
    async fn list_keys(&self, guild_id: u64, user_id: u64) -> Result<Vec<ApiKeyRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM api_keys WHERE guild_id = ? AND user_id = ? ORDER BY name_key",
        )
        .bind(guild_id as i64)
        .bind(user_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut guilds = self.guilds_by_key(guild_id, user_id).await?;
        rows.iter()
            .map(|row| {
                let name_key: String = row.get("name_key");
                record_from_row(row, guilds.remove(&name_key).unwrap_or_default())
            })
            .collect()
    }

    async fn find_key(
        &self,
        guild_id: u64,
        user_id: u64,
        name: &str,
    ) -> Result<Option<ApiKeyRecord>, StoreError> {
        let name_key = name.trim().to_lowercase();
        let row = sqlx::query("SELECT * FROM api_keys WHERE guild_id = ? AND user_id = ? AND name_key = ?")
            .bind(guild_id as i64)
            .bind(user_id as i64)
            .bind(&name_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        match row {
            Some(row) => {
                let mut guilds = self.guilds_by_key(guild_id, user_id).await?;
                Ok(Some(record_from_row(&row, guilds.remove(&name_key).unwrap_or_default())?))
            }
            None => Ok(None),
        }
    }

    async fn upsert_key(&self, guild_id: u64, user_id: u64, record: &ApiKeyRecord) -> Result<(), StoreError> {
        let name_key = record.name.trim().to_lowercase();
        let permissions = serde_json::to_string(&record.permissions)?;

        let mut tx = self.pool.begin().await.map_err(db)?;
        sqlx::query(
            r#"
            INSERT INTO api_keys
                (guild_id, user_id, name, name_key, api_key, account_name, permissions, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(guild_id, user_id, name_key) DO UPDATE SET
                name = excluded.name,
                api_key = excluded.api_key,
                account_name = excluded.account_name,
                permissions = excluded.permissions,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(guild_id as i64)
        .bind(user_id as i64)
        .bind(&record.name)
        .bind(&name_key)
        .bind(&record.key)
        .bind(&record.account_name)
        .bind(&permissions)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        sqlx::query("DELETE FROM api_key_guilds WHERE guild_id = ? AND user_id = ? AND name_key = ?")
            .bind(guild_id as i64)
            .bind(user_id as i64)
            .bind(&name_key)
            .execute(&mut *tx)
            .await
            .map_err(db)?;

        for gw2_guild_id in &record.guild_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO api_key_guilds (guild_id, user_id, name_key, gw2_guild_id)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(guild_id as i64)
            .bind(user_id as i64)
            .bind(&name_key)
            .bind(gw2_guild_id)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        }

        tx.commit().await.map_err(db)?;
        Ok(())
    }

    async fn delete_key(&self, guild_id: u64, user_id: u64, name: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE guild_id = ? AND user_id = ? AND name_key = ?")
            .bind(guild_id as i64)
            .bind(user_id as i64)
            .bind(name.trim().to_lowercase())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_guild_details(&self, details: &[GuildDetails]) -> Result<(), StoreError> {
        let now = Utc::now();
        for guild in details {
            sqlx::query(
                r#"
                INSERT INTO guild_details (gw2_guild_id, name, tag, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(gw2_guild_id) DO UPDATE SET
                    name = excluded.name,
                    tag = excluded.tag,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&guild.id)
            .bind(&guild.name)
            .bind(&guild.tag)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        }
        Ok(())
    }

    async fn guild_labels(&self, guild_ids: &[String]) -> Result<HashMap<String, String>, StoreError> {
        let mut labels = HashMap::new();
        for id in guild_ids {
            let row = sqlx::query("SELECT gw2_guild_id, name, tag FROM guild_details WHERE gw2_guild_id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?;
            if let Some(row) = row {
                let details = GuildDetails {
                    id: row.get("gw2_guild_id"),
                    name: row.get("name"),
                    tag: row.get("tag"),
                };
                labels.insert(details.id.clone(), details.label());
            }
        }
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str, key: &str, guilds: &[&str]) -> ApiKeyRecord {
        let now = Utc::now();
        ApiKeyRecord {
            name: name.to_string(),
            key: key.to_string(),
            account_name: "Tester.1234".to_string(),
            permissions: vec!["account".into(), "guilds".into()],
            guild_ids: guilds.iter().map(|g| g.to_string()).collect(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn store(dir: &TempDir) -> SqliteApiKeyStore {
        SqliteApiKeyStore::new(&dir.path().join("nested").join("api_keys.sqlite"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn keys_are_scoped_by_guild_and_user() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store.upsert_key(1, 10, &record("Main", "KEY-A", &["g1", "g2"])).await.unwrap();
        store.upsert_key(1, 11, &record("Main", "KEY-B", &[])).await.unwrap();
        store.upsert_key(2, 10, &record("Other", "KEY-C", &[])).await.unwrap();

        let keys = store.list_keys(1, 10).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].key, "KEY-A");
        assert_eq!(keys[0].guild_ids, vec!["g1", "g2"]);
        assert_eq!(keys[0].permissions, vec!["account", "guilds"]);

        let found = store.find_key(1, 11, "  MAIN ").await.unwrap().unwrap();
        assert_eq!(found.key, "KEY-B");
        assert!(store.find_key(2, 11, "main").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_guild_memberships() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store.upsert_key(1, 10, &record("Main", "KEY-A", &["g1", "g2"])).await.unwrap();
        store.upsert_key(1, 10, &record("main", "KEY-A2", &["g3"])).await.unwrap();

        let keys = store.list_keys(1, 10).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].name, "main");
        assert_eq!(keys[0].key, "KEY-A2");
        assert_eq!(keys[0].guild_ids, vec!["g3"]);
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_was_removed() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.upsert_key(1, 10, &record("Main", "KEY-A", &["g1"])).await.unwrap();

        assert!(store.delete_key(1, 10, "MAIN").await.unwrap());
        assert!(!store.delete_key(1, 10, "main").await.unwrap());
        assert!(store.list_keys(1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn guild_labels_come_from_the_cache() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store
            .upsert_guild_details(&[GuildDetails {
                id: "g1".into(),
                name: "Tyrian Explorers".into(),
                tag: Some("TE".into()),
            }])
            .await
            .unwrap();

        let labels = store
            .guild_labels(&["g1".to_string(), "unknown".to_string()])
            .await
            .unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels["g1"], "Tyrian Explorers [TE]");
    }
}
