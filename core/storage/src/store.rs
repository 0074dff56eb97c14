//! Local store and key-value store trait definitions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use budgetsync_common::{EntityId, EntityKind, Result, SyncableEntity};

/// Well-known preference key holding the last successful sync instant.
pub const LAST_SYNC_AT_KEY: &str = "last_sync_at";

/// On-device record store consumed by the sync engine.
///
/// Implementations own persistence of domain records. The engine only ever
/// lists records of one kind, writes records back, and flips the synced flag.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Get the store name (e.g., "memory", "sqlite").
    fn name(&self) -> &str;

    /// List every record of the given kind.
    async fn list_all(&self, kind: EntityKind) -> Result<Vec<SyncableEntity>>;

    /// Insert or replace a record, keyed by kind and id.
    ///
    /// # Postconditions
    /// - A later `list_all(entity.kind)` returns exactly this value for `entity.id`
    async fn upsert(&self, entity: SyncableEntity) -> Result<()>;

    /// Set the synced flag of a stored record, leaving its payload alone.
    ///
    /// The flag is only set while the stored `last_modified` still equals
    /// `uploaded`. Returns `false` when the record was edited or removed
    /// after that version was read.
    async fn mark_synced(
        &self,
        kind: EntityKind,
        id: &EntityId,
        uploaded: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Durable string key-value storage (application preferences).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}
