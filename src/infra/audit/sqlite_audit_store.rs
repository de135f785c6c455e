use crate::core::audit::{AuditRecord, AuditStore, Gw2AuditEvent};
use crate::core::store::{GuildLocks, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::PathBuf;

const AUDIT_FILE: &str = "audit.sqlite";

/// One SQLite database per guild at `<root>/guild_<id>/audit.sqlite`. Pools
/// are opened on first use and kept for the life of the process.
pub struct SqliteAuditStore {
    root: PathBuf,
    pools: DashMap<u64, Pool<Sqlite>>,
    open_locks: GuildLocks,
}

fn db(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

impl SqliteAuditStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pools: DashMap::new(),
            open_locks: GuildLocks::new(),
        }
    }

    async fn pool(&self, guild_id: u64) -> Result<Pool<Sqlite>, StoreError> {
        if let Some(pool) = self.pools.get(&guild_id) {
            return Ok(pool.clone());
        }

        let _guard = self.open_locks.lock(guild_id).await;
        if let Some(pool) = self.pools.get(&guild_id) {
            return Ok(pool.clone());
        }

        let dir = self.root.join(format!("guild_{guild_id}"));
        tokio::fs::create_dir_all(&dir).await?;
        let options = SqliteConnectOptions::new()
            .filename(dir.join(AUDIT_FILE))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(db)?;
        migrate(&pool).await.map_err(db)?;

        self.pools.insert(guild_id, pool.clone());
        Ok(pool)
    }
}

async fn migrate(pool: &Pool<Sqlite>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS discord_audit_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            event_type TEXT NOT NULL,
            actor_id INTEGER,
            actor_name TEXT,
            target_id INTEGER,
            target_name TEXT,
            summary TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gw2_audit_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            log_id INTEGER UNIQUE,
            created_at TEXT NOT NULL,
            event_type TEXT NOT NULL,
            user TEXT,
            details TEXT NOT NULL DEFAULT '{}'
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gw2_sync_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            last_log_id INTEGER,
            synced_at TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

fn discord_event(row: &SqliteRow) -> AuditRecord {
    AuditRecord {
        event_type: row.get("event_type"),
        actor_id: row.get::<Option<i64>, _>("actor_id").map(|id| id as u64),
        actor_name: row.get("actor_name"),
        target_id: row.get::<Option<i64>, _>("target_id").map(|id| id as u64),
        target_name: row.get("target_name"),
        summary: row.get("summary"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    }
}

fn gw2_event(row: &SqliteRow) -> Gw2AuditEvent {
    let details: String = row.get("details");
    Gw2AuditEvent {
        log_id: row.get::<Option<i64>, _>("log_id").map(|id| id as u64),
        created_at: row.get("created_at"),
        event_type: row.get("event_type"),
        user: row.get("user"),
        details: serde_json::from_str(&details).unwrap_or(serde_json::Value::String(details)),
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn add_discord_event(&self, guild_id: u64, record: &AuditRecord) -> Result<(), StoreError> {
        let pool = self.pool(guild_id).await?;
        sqlx::query(
            r#"
            INSERT INTO discord_audit_events
                (created_at, event_type, actor_id, actor_name, target_id, target_name, summary)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.created_at)
        .bind(&record.event_type)
        .bind(record.actor_id.map(|id| id as i64))
        .bind(&record.actor_name)
        .bind(record.target_id.map(|id| id as i64))
        .bind(&record.target_name)
        .bind(&record.summary)
        .execute(&pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn recent_discord_events(&self, guild_id: u64, limit: u32) -> Result<Vec<AuditRecord>, StoreError> {
        let pool = self.pool(guild_id).await?;
        let rows = sqlx::query("SELECT * FROM discord_audit_events ORDER BY id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&pool)
            .await
            .map_err(db)?;
        Ok(rows.iter().map(discord_event).collect())
    }

    async fn query_discord_events(
        &self,
        guild_id: u64,
        user_id: Option<u64>,
        user_query: &str,
        limit: u32,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let pool = self.pool(guild_id).await?;
        let id = user_id.map(|id| id as i64);
        let needle = user_query.trim().to_lowercase();
        let rows = sqlx::query(
            r#"
            SELECT * FROM discord_audit_events
            WHERE (?1 IS NOT NULL AND (actor_id = ?1 OR target_id = ?1))
               OR (?2 != '' AND (instr(lower(coalesce(actor_name, '')), ?2) > 0
                              OR instr(lower(coalesce(target_name, '')), ?2) > 0))
            ORDER BY id DESC
            LIMIT ?3
            "#,
        )
        .bind(id)
        .bind(&needle)
        .bind(limit as i64)
        .fetch_all(&pool)
        .await
        .map_err(db)?;
        Ok(rows.iter().map(discord_event).collect())
    }

    async fn add_gw2_event(&self, guild_id: u64, event: &Gw2AuditEvent) -> Result<(), StoreError> {
        let pool = self.pool(guild_id).await?;
        let details = serde_json::to_string(&event.details)?;
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO gw2_audit_events (log_id, created_at, event_type, user, details)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.log_id.map(|id| id as i64))
        .bind(&event.created_at)
        .bind(&event.event_type)
        .bind(&event.user)
        .bind(&details)
        .execute(&pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn query_gw2_events(
        &self,
        guild_id: u64,
        user_query: &str,
        limit: u32,
    ) -> Result<Vec<Gw2AuditEvent>, StoreError> {
        let pool = self.pool(guild_id).await?;
        let rows = sqlx::query(
            r#"
            SELECT * FROM gw2_audit_events
            WHERE instr(lower(coalesce(user, '')), ?) > 0
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(user_query.trim().to_lowercase())
        .bind(limit as i64)
        .fetch_all(&pool)
        .await
        .map_err(db)?;
        Ok(rows.iter().map(gw2_event).collect())
    }

    async fn gw2_last_log_id(&self, guild_id: u64) -> Result<Option<u64>, StoreError> {
        let pool = self.pool(guild_id).await?;
        let row = sqlx::query("SELECT last_log_id FROM gw2_sync_state WHERE id = 1")
            .fetch_optional(&pool)
            .await
            .map_err(db)?;
        Ok(row
            .and_then(|row| row.get::<Option<i64>, _>("last_log_id"))
            .map(|id| id as u64))
    }

    async fn set_gw2_last_log_id(
        &self,
        guild_id: u64,
        log_id: Option<u64>,
        synced_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let pool = self.pool(guild_id).await?;
        sqlx::query(
            r#"
            INSERT INTO gw2_sync_state (id, last_log_id, synced_at)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                last_log_id = excluded.last_log_id,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(log_id.map(|id| id as i64))
        .bind(synced_at)
        .execute(&pool)
        .await
        .map_err(db)?;
        Ok(())
    }
}
