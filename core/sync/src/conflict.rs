//! Conflict detection results and resolution policy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use budgetsync_common::{EntityId, EntityKind};

use crate::batch::SyncBatch;

/// Conflict resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// The server version is authoritative; the local upload is discarded.
    #[default]
    ServerWins,
    /// The uploaded local version overwrites the server.
    ClientWins,
    /// The server merges both versions.
    Merge,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::ServerWins => "server-wins",
            ConflictStrategy::ClientWins => "client-wins",
            ConflictStrategy::Merge => "merge",
        }
    }
}

/// A record the server rejected because its state diverged from the upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    /// Identifier of the conflicted record.
    pub item_id: EntityId,
    /// Kind of the record, when the server reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntityKind>,
}

impl ConflictInfo {
    pub fn new(item_id: EntityId) -> Self {
        Self {
            item_id,
            kind: None,
        }
    }
}

/// Decision sent back to the server for one conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolution {
    pub item_id: EntityId,
    pub resolution: ConflictStrategy,
}

/// Assigns a resolution strategy to each conflict.
///
/// Strategies are looked up per entity kind; kinds without an override use
/// the default strategy, which is server-wins unless configured otherwise.
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    default_strategy: ConflictStrategy,
    overrides: BTreeMap<EntityKind, ConflictStrategy>,
}

impl ConflictResolver {
    /// Create a resolver with the given default strategy and no overrides.
    pub fn new(default_strategy: ConflictStrategy) -> Self {
        Self {
            default_strategy,
            overrides: BTreeMap::new(),
        }
    }

    /// Use `strategy` for every conflict on records of `kind`.
    pub fn with_override(mut self, kind: EntityKind, strategy: ConflictStrategy) -> Self {
        self.overrides.insert(kind, strategy);
        self
    }

    /// Get the default resolution strategy.
    pub fn default_strategy(&self) -> ConflictStrategy {
        self.default_strategy
    }

    /// Strategy applied to records of `kind`.
    pub fn strategy_for(&self, kind: Option<EntityKind>) -> ConflictStrategy {
        kind.and_then(|k| self.overrides.get(&k).copied())
            .unwrap_or(self.default_strategy)
    }

    /// Build one resolution per conflict.
    ///
    /// The kind of a conflict comes from the server when present, otherwise
    /// from the uploaded batch. Unknown records fall back to the default.
    pub fn resolve(&self, conflicts: &[ConflictInfo], batch: &SyncBatch) -> Vec<ConflictResolution> {
        conflicts
            .iter()
            .map(|conflict| {
                let kind = conflict.kind.or_else(|| batch.kind_of(&conflict.item_id));
                let resolution = self.strategy_for(kind);
                debug!(
                    "Resolving conflict on {} ({:?}) as {}",
                    conflict.item_id,
                    kind,
                    resolution.as_str()
                );
                ConflictResolution {
                    item_id: conflict.item_id.clone(),
                    resolution,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use budgetsync_common::SyncableEntity;

    fn id(s: &str) -> EntityId {
        EntityId::new(s).unwrap()
    }

    fn batch() -> SyncBatch {
        SyncBatch::new(
            vec![
                SyncableEntity::new(EntityKind::Account, id("a1"), serde_json::Value::Null),
                SyncableEntity::new(EntityKind::Goal, id("g1"), serde_json::Value::Null),
            ],
            None,
        )
    }

    #[test]
    fn test_default_is_server_wins() {
        let resolver = ConflictResolver::default();
        let conflicts = vec![ConflictInfo::new(id("a1")), ConflictInfo::new(id("g1"))];

        let resolutions = resolver.resolve(&conflicts, &batch());

        assert_eq!(resolutions.len(), 2);
        assert!(resolutions
            .iter()
            .all(|r| r.resolution == ConflictStrategy::ServerWins));
    }

    #[test]
    fn test_override_uses_batch_kind() {
        let resolver = ConflictResolver::default()
            .with_override(EntityKind::Goal, ConflictStrategy::ClientWins);
        let conflicts = vec![ConflictInfo::new(id("a1")), ConflictInfo::new(id("g1"))];

        let resolutions = resolver.resolve(&conflicts, &batch());

        assert_eq!(resolutions[0].resolution, ConflictStrategy::ServerWins);
        assert_eq!(resolutions[1].resolution, ConflictStrategy::ClientWins);
    }

    #[test]
    fn test_server_reported_kind_wins_over_batch() {
        let resolver = ConflictResolver::default()
            .with_override(EntityKind::Budget, ConflictStrategy::Merge);
        let conflict = ConflictInfo {
            item_id: id("a1"),
            kind: Some(EntityKind::Budget),
        };

        let resolutions = resolver.resolve(&[conflict], &batch());
        assert_eq!(resolutions[0].resolution, ConflictStrategy::Merge);
    }

    #[test]
    fn test_unknown_item_uses_default() {
        let resolver = ConflictResolver::new(ConflictStrategy::Merge)
            .with_override(EntityKind::Account, ConflictStrategy::ClientWins);
        let resolutions = resolver.resolve(&[ConflictInfo::new(id("zzz"))], &batch());
        assert_eq!(resolutions[0].resolution, ConflictStrategy::Merge);
    }

    #[test]
    fn test_resolution_wire_format() {
        let resolution = ConflictResolution {
            item_id: id("t9"),
            resolution: ConflictStrategy::ServerWins,
        };
        let json = serde_json::to_value(&resolution).unwrap();
        assert_eq!(json, serde_json::json!({"itemId": "t9", "resolution": "server-wins"}));
    }

    #[test]
    fn test_conflict_info_kind_optional() {
        let info: ConflictInfo = serde_json::from_str(r#"{"itemId": "x1"}"#).unwrap();
        assert_eq!(info.item_id, id("x1"));
        assert!(info.kind.is_none());
    }
}
