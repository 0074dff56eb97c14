//! Domain types shared by the store, the sync engine and the transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a syncable record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create a new EntityId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "EntityId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The finite set of domain record kinds that take part in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Account,
    Transaction,
    Budget,
    Goal,
}

impl EntityKind {
    /// Every kind, in upload order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Account,
        EntityKind::Transaction,
        EntityKind::Budget,
        EntityKind::Goal,
    ];

    /// Wire and storage name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Account => "account",
            EntityKind::Transaction => "transaction",
            EntityKind::Budget => "budget",
            EntityKind::Goal => "goal",
        }
    }

    /// Whether records of this kind carry a meaningful synced flag.
    ///
    /// Budgets and goals never got one, so they are uploaded in full on
    /// every attempt and are never marked synced.
    pub fn tracks_sync_flag(&self) -> bool {
        matches!(self, EntityKind::Account | EntityKind::Transaction)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "account" => Ok(EntityKind::Account),
            "transaction" => Ok(EntityKind::Transaction),
            "budget" => Ok(EntityKind::Budget),
            "goal" => Ok(EntityKind::Goal),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown entity kind: {}",
                other
            ))),
        }
    }
}

/// A domain record (account, transaction, budget, goal) as seen by sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncableEntity {
    /// Unique identifier.
    pub id: EntityId,
    /// Domain kind.
    pub kind: EntityKind,
    /// Set once the record has been accepted by the server.
    #[serde(default)]
    pub synced: bool,
    /// Last local modification time.
    pub last_modified: DateTime<Utc>,
    /// Domain fields, opaque to sync.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl SyncableEntity {
    /// Create a new, never synced record modified now.
    pub fn new(kind: EntityKind, id: EntityId, payload: serde_json::Value) -> Self {
        Self {
            id,
            kind,
            synced: false,
            last_modified: Utc::now(),
            payload,
        }
    }

    /// Whether this record must be part of the next upload.
    ///
    /// A record is eligible when it was never synced or was modified after
    /// the watermark. Kinds without a synced flag are always eligible.
    pub fn is_eligible(&self, watermark: Option<DateTime<Utc>>) -> bool {
        if !self.kind.tracks_sync_flag() {
            return true;
        }
        if !self.synced {
            return true;
        }
        match watermark {
            Some(watermark) => self.last_modified > watermark,
            None => false,
        }
    }

    /// Mark the record as accepted by the server.
    pub fn mark_synced(&mut self) {
        self.synced = true;
    }

    /// Record a local edit: replaces the payload and clears the synced flag.
    pub fn touch(&mut self, payload: serde_json::Value) {
        self.payload = payload;
        self.synced = false;
        self.last_modified = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn entity(kind: EntityKind, synced: bool, last_modified: DateTime<Utc>) -> SyncableEntity {
        SyncableEntity {
            id: EntityId::new("e-1").unwrap(),
            kind,
            synced,
            last_modified,
            payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_entity_id_creation() {
        let id = EntityId::new("acc-1").unwrap();
        assert_eq!(id.as_str(), "acc-1");
    }

    #[test]
    fn test_entity_id_empty_fails() {
        assert!(EntityId::new("").is_err());
        assert!(EntityId::new("   ").is_err());
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(EntityId::generate(), EntityId::generate());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("account".parse::<EntityKind>().unwrap(), EntityKind::Account);
        assert_eq!("Goal".parse::<EntityKind>().unwrap(), EntityKind::Goal);
        assert!("invoice".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&EntityKind::Transaction).unwrap();
        assert_eq!(json, "\"transaction\"");
    }

    #[test]
    fn test_unsynced_is_eligible_without_watermark() {
        let e = entity(EntityKind::Account, false, Utc::now());
        assert!(e.is_eligible(None));
    }

    #[test]
    fn test_synced_is_not_eligible_without_watermark() {
        let e = entity(EntityKind::Account, true, Utc::now());
        assert!(!e.is_eligible(None));
    }

    #[test]
    fn test_synced_but_modified_after_watermark_is_eligible() {
        let watermark = Utc::now() - Duration::minutes(10);
        let e = entity(EntityKind::Transaction, true, Utc::now());
        assert!(e.is_eligible(Some(watermark)));
    }

    #[test]
    fn test_budgets_and_goals_always_eligible() {
        let watermark = Utc::now();
        let old = watermark - Duration::days(1);
        assert!(entity(EntityKind::Budget, true, old).is_eligible(Some(watermark)));
        assert!(entity(EntityKind::Goal, true, old).is_eligible(Some(watermark)));
    }

    #[test]
    fn test_touch_clears_synced_flag() {
        let mut e = entity(EntityKind::Account, true, Utc::now() - Duration::hours(1));
        let before = e.last_modified;
        e.touch(serde_json::json!({"name": "Checking"}));
        assert!(!e.synced);
        assert!(e.last_modified > before);
    }

    #[test]
    fn test_entity_wire_shape() {
        let e = entity(EntityKind::Account, false, Utc::now());
        let value = serde_json::to_value(&e).unwrap();
        assert_eq!(value["kind"], "account");
        assert_eq!(value["id"], "e-1");
        assert!(value.get("lastModified").is_some());
    }

    proptest! {
        #[test]
        fn prop_eligibility_matches_invariant(
            synced in any::<bool>(),
            modified_offset in -10_000i64..10_000,
            has_watermark in any::<bool>(),
        ) {
            let watermark = Utc::now();
            let e = entity(
                EntityKind::Account,
                synced,
                watermark + Duration::seconds(modified_offset),
            );
            let wm = if has_watermark { Some(watermark) } else { None };
            let expected = !synced || wm.map(|w| e.last_modified > w).unwrap_or(false);
            prop_assert_eq!(e.is_eligible(wm), expected);
        }

        #[test]
        fn prop_marked_synced_is_excluded_when_older_than_watermark(
            modified_offset in 1i64..10_000,
        ) {
            let watermark = Utc::now();
            let mut e = entity(
                EntityKind::Transaction,
                false,
                watermark - Duration::seconds(modified_offset),
            );
            prop_assert!(e.is_eligible(Some(watermark)));
            e.mark_synced();
            prop_assert!(!e.is_eligible(Some(watermark)));
        }
    }
}
