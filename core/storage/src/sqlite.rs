//! SQLite-backed local store.
//!
//! Keeps domain records and application preferences in a single database
//! file, so the app keeps working offline and resumes sync after restarts.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use budgetsync_common::{EntityId, EntityKind, Error, Result, SyncableEntity};

use crate::store::{KeyValueStore, LocalStore};

/// Local store using SQLite.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn sql_err(err: rusqlite::Error) -> Error {
    Error::Storage(err.to_string())
}

impl SqliteStore {
    /// Create or open a store database.
    ///
    /// # Arguments
    /// - `db_path`: Path to the SQLite database file
    ///
    /// # Errors
    /// - Database creation or migration failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(sql_err)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                synced INTEGER NOT NULL,
                last_modified TEXT NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (kind, id)
            );

            CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .map_err(sql_err)?;

        info!("Local store opened successfully");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("Store connection poisoned".to_string()))
    }

    fn row_to_entity(
        kind: EntityKind,
        id: String,
        synced: i32,
        last_modified: String,
        payload: String,
    ) -> Result<SyncableEntity> {
        let last_modified = DateTime::parse_from_rfc3339(&last_modified)
            .map_err(|e| Error::Serialization(format!("Bad timestamp for {}: {}", id, e)))?
            .with_timezone(&Utc);

        Ok(SyncableEntity {
            id: EntityId::new(id)?,
            kind,
            synced: synced != 0,
            last_modified,
            payload: serde_json::from_str(&payload)?,
        })
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn list_all(&self, kind: EntityKind) -> Result<Vec<SyncableEntity>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, synced, last_modified, payload
                FROM entities WHERE kind = ?1
                ORDER BY id
                "#,
            )
            .map_err(sql_err)?;

        let rows = stmt
            .query_map([kind.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(sql_err)?;

        let mut entities = Vec::new();
        for row in rows {
            let (id, synced, last_modified, payload) = row.map_err(sql_err)?;
            entities.push(Self::row_to_entity(kind, id, synced, last_modified, payload)?);
        }
        Ok(entities)
    }

    async fn upsert(&self, entity: SyncableEntity) -> Result<()> {
        debug!("Upserting {} {}", entity.kind, entity.id);
        let payload = serde_json::to_string(&entity.payload)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO entities
            (kind, id, synced, last_modified, payload)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                entity.kind.as_str(),
                entity.id.as_str(),
                entity.synced as i32,
                entity
                    .last_modified
                    .to_rfc3339_opts(SecondsFormat::Nanos, true),
                payload,
            ],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    async fn mark_synced(
        &self,
        kind: EntityKind,
        id: &EntityId,
        uploaded: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                r#"
                UPDATE entities SET synced = 1
                WHERE kind = ?1 AND id = ?2 AND last_modified = ?3
                "#,
                params![
                    kind.as_str(),
                    id.as_str(),
                    uploaded.to_rfc3339_opts(SecondsFormat::Nanos, true),
                ],
            )
            .map_err(sql_err)?;

        Ok(changed > 0)
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT value FROM preferences WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()
        .map_err(sql_err)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO preferences (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM preferences WHERE key = ?1", [key])
            .map_err(sql_err)?;
        Ok(())
    }
}
