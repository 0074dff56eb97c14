//! Remote transport trait and wire types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use budgetsync_common::{EntityId, EntityKind, Result, SyncableEntity};

use crate::batch::SyncBatch;
use crate::conflict::{ConflictInfo, ConflictResolution};

/// Payload of a successful upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadData {
    /// Number of records the server accepted.
    #[serde(default)]
    pub items_synced: usize,
    /// Records rejected because the server state diverged.
    #[serde(default)]
    pub conflicts: Vec<ConflictInfo>,
    /// Server-side completion time.
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
}

/// Server answer to an upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<UploadData>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl UploadResponse {
    /// Accepted upload.
    pub fn accepted(data: UploadData) -> Self {
        Self {
            success: true,
            data: Some(data),
            error_message: None,
        }
    }

    /// Upload declined by the server.
    pub fn declined(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error_message: Some(message.into()),
        }
    }
}

/// A record changed on the server, as downloaded.
///
/// The kind is kept as a raw string so records of kinds this client does not
/// know about can be skipped instead of failing the whole download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteItem {
    pub kind: String,
    pub id: String,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RemoteItem {
    /// Known kind of this item, `None` for kinds this client does not handle.
    pub fn entity_kind(&self) -> Option<EntityKind> {
        self.kind.parse().ok()
    }

    /// Convert into a local record of the given kind, flagged as synced.
    ///
    /// # Errors
    /// - Empty identifier
    pub fn into_synced_entity(self, kind: EntityKind) -> Result<SyncableEntity> {
        Ok(SyncableEntity {
            id: EntityId::new(self.id)?,
            kind,
            synced: true,
            last_modified: self.last_modified,
            payload: self.payload,
        })
    }
}

impl From<SyncableEntity> for RemoteItem {
    fn from(entity: SyncableEntity) -> Self {
        Self {
            kind: entity.kind.as_str().to_string(),
            id: entity.id.to_string(),
            last_modified: entity.last_modified,
            payload: entity.payload,
        }
    }
}

/// Payload of a successful download.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadData {
    #[serde(default)]
    pub items: Vec<RemoteItem>,
}

/// Server answer to a download.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<DownloadData>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl DownloadResponse {
    /// Successful download of `items`.
    pub fn items(items: Vec<RemoteItem>) -> Self {
        Self {
            success: true,
            data: Some(DownloadData { items }),
            error_message: None,
        }
    }

    /// Download declined by the server.
    pub fn declined(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error_message: Some(message.into()),
        }
    }
}

/// Network access to the hosted sync service.
///
/// Implementations report an unreachable service as `Error::Network` and
/// an expired deadline as `Error::Timeout` so the engine can retry them.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Upload locally changed records.
    async fn upload(&self, batch: &SyncBatch) -> Result<UploadResponse>;

    /// Download records changed on the server since `since` (everything when `None`).
    async fn download(&self, since: Option<DateTime<Utc>>) -> Result<DownloadResponse>;

    /// Send conflict decisions back to the server.
    async fn resolve_conflicts(&self, resolutions: &[ConflictResolution]) -> Result<()>;

    /// Forward a failure to the server's error log.
    async fn log_error(&self, context: &str, message: &str) -> Result<()>;
}
