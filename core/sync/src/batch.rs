//! Upload batch preparation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use budgetsync_common::{EntityId, EntityKind, SyncableEntity};

/// Records prepared for one upload, plus the watermark they were selected against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatch {
    /// Eligible records, in the order they were collected.
    #[serde(rename = "createdItems")]
    pub entities: Vec<SyncableEntity>,
    /// Watermark captured when the batch was prepared.
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl SyncBatch {
    /// Create a batch from already-selected records.
    pub fn new(entities: Vec<SyncableEntity>, last_sync_at: Option<DateTime<Utc>>) -> Self {
        Self {
            entities,
            last_sync_at,
        }
    }

    /// Select the eligible records out of `candidates`.
    ///
    /// See [`SyncableEntity::is_eligible`] for the rule.
    pub fn prepare(
        candidates: impl IntoIterator<Item = SyncableEntity>,
        watermark: Option<DateTime<Utc>>,
    ) -> Self {
        let entities = candidates
            .into_iter()
            .filter(|e| e.is_eligible(watermark))
            .collect();
        Self::new(entities, watermark)
    }

    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Kind of a record in this batch.
    pub fn kind_of(&self, id: &EntityId) -> Option<EntityKind> {
        self.entities.iter().find(|e| &e.id == id).map(|e| e.kind)
    }

    /// Records of this batch whose kind carries a synced flag.
    pub fn flag_tracked(&self) -> impl Iterator<Item = &SyncableEntity> + '_ {
        self.entities.iter().filter(|e| e.kind.tracks_sync_flag())
    }
}
