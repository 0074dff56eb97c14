//! In-memory stores for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use budgetsync_common::{EntityId, EntityKind, Result, SyncableEntity};

use crate::store::{KeyValueStore, LocalStore};

/// In-memory local record store.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop. Records are listed in id order.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<(EntityKind, EntityId), SyncableEntity>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with the given records.
    pub fn with_records(records: impl IntoIterator<Item = SyncableEntity>) -> Self {
        let records = records
            .into_iter()
            .map(|e| ((e.kind, e.id.clone()), e))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Fetch a single record.
    pub async fn get(&self, kind: EntityKind, id: &EntityId) -> Option<SyncableEntity> {
        self.records.read().await.get(&(kind, id.clone())).cloned()
    }

    /// Total number of records across all kinds.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Check if empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_all(&self, kind: EntityKind) -> Result<Vec<SyncableEntity>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn upsert(&self, entity: SyncableEntity) -> Result<()> {
        self.records
            .write()
            .await
            .insert((entity.kind, entity.id.clone()), entity);
        Ok(())
    }

    async fn mark_synced(
        &self,
        kind: EntityKind,
        id: &EntityId,
        uploaded: DateTime<Utc>,
    ) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&(kind, id.clone())) {
            Some(entity) if entity.last_modified == uploaded => {
                entity.mark_synced();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// In-memory preference store.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    /// Create a new empty key-value store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}
