//! Test doubles shared by the engine and scheduler tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Semaphore};

use budgetsync_common::{EntityId, EntityKind, Error, Result, SyncableEntity};
use budgetsync_storage::{KeyValueStore, LocalStore, MemoryKeyValueStore, MemoryStore};

use crate::batch::SyncBatch;
use crate::conflict::ConflictResolution;
use crate::connectivity::{ManualConnectivity, NetworkAccess};
use crate::engine::{SyncConfig, SyncEngine};
use crate::events::SyncEvent;
use crate::reporter::{ErrorContext, ErrorReporter};
use crate::transport::{DownloadResponse, RemoteItem, RemoteTransport, UploadData, UploadResponse};

/// Scriptable in-memory transport that records every call.
#[derive(Default)]
pub struct MockTransport {
    upload_script: Mutex<VecDeque<Result<UploadResponse>>>,
    download_script: Mutex<VecDeque<Result<DownloadResponse>>>,
    download_items: Mutex<Vec<RemoteItem>>,
    pub uploads: Mutex<Vec<SyncBatch>>,
    pub downloads: Mutex<Vec<Option<DateTime<Utc>>>>,
    pub resolutions: Mutex<Vec<Vec<ConflictResolution>>>,
    pub calls: Mutex<Vec<&'static str>>,
    pub logged_errors: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose uploads wait for a permit on the returned semaphore.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let transport = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (transport, gate)
    }

    /// Queue the result of the next upload; unscripted uploads are accepted.
    pub fn push_upload(&self, result: Result<UploadResponse>) {
        self.upload_script.lock().unwrap().push_back(result);
    }

    /// Queue the result of the next download; unscripted downloads return
    /// the items set with `set_download_items`.
    pub fn push_download(&self, result: Result<DownloadResponse>) {
        self.download_script.lock().unwrap().push_back(result);
    }

    pub fn set_download_items(&self, items: Vec<RemoteItem>) {
        *self.download_items.lock().unwrap() = items;
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }

    pub fn last_upload(&self) -> Option<SyncBatch> {
        self.uploads.lock().unwrap().last().cloned()
    }

    pub fn call_order(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn upload(&self, batch: &SyncBatch) -> Result<UploadResponse> {
        self.calls.lock().unwrap().push("upload");
        self.uploads.lock().unwrap().push(batch.clone());
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        let scripted = self.upload_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(UploadResponse::accepted(UploadData {
                items_synced: batch.len(),
                conflicts: Vec::new(),
                synced_at: Some(Utc::now()),
            }))
        })
    }

    async fn download(&self, since: Option<DateTime<Utc>>) -> Result<DownloadResponse> {
        self.calls.lock().unwrap().push("download");
        self.downloads.lock().unwrap().push(since);
        let scripted = self.download_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(DownloadResponse::items(
                self.download_items.lock().unwrap().clone(),
            ))
        })
    }

    async fn resolve_conflicts(&self, resolutions: &[ConflictResolution]) -> Result<()> {
        self.calls.lock().unwrap().push("resolve_conflicts");
        self.resolutions.lock().unwrap().push(resolutions.to_vec());
        Ok(())
    }

    async fn log_error(&self, _context: &str, _message: &str) -> Result<()> {
        self.logged_errors.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Memory store that counts how often it is touched.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    pub list_calls: AtomicUsize,
    pub upsert_calls: AtomicUsize,
}

impl CountingStore {
    pub fn with_records(records: impl IntoIterator<Item = SyncableEntity>) -> Self {
        Self {
            inner: MemoryStore::with_records(records),
            ..Self::default()
        }
    }

    pub fn touches(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst) + self.upsert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalStore for CountingStore {
    fn name(&self) -> &str {
        "counting"
    }

    async fn list_all(&self, kind: EntityKind) -> Result<Vec<SyncableEntity>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_all(kind).await
    }

    async fn upsert(&self, entity: SyncableEntity) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(entity).await
    }

    async fn mark_synced(
        &self,
        kind: EntityKind,
        id: &EntityId,
        uploaded: DateTime<Utc>,
    ) -> Result<bool> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.mark_synced(kind, id, uploaded).await
    }
}

/// Preference store whose writes always fail.
#[derive(Default)]
pub struct ReadOnlyPreferences;

#[async_trait]
impl KeyValueStore for ReadOnlyPreferences {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(Error::Storage("preferences are read-only".to_string()))
    }

    async fn remove(&self, _key: &str) -> Result<()> {
        Err(Error::Storage("preferences are read-only".to_string()))
    }
}

/// Reporter that remembers every report.
#[derive(Default)]
pub struct RecordingReporter {
    pub reports: Mutex<Vec<(ErrorContext, String)>>,
}

impl RecordingReporter {
    pub fn contexts(&self) -> Vec<ErrorContext> {
        self.reports.lock().unwrap().iter().map(|(c, _)| *c).collect()
    }
}

#[async_trait]
impl ErrorReporter for RecordingReporter {
    async fn report(&self, context: ErrorContext, error: &Error) {
        self.reports
            .lock()
            .unwrap()
            .push((context, error.to_string()));
    }
}

/// All collaborators of an engine, kept around for assertions.
pub struct Harness {
    pub store: Arc<CountingStore>,
    pub transport: Arc<MockTransport>,
    pub connectivity: Arc<ManualConnectivity>,
    pub preferences: Arc<MemoryKeyValueStore>,
    pub reporter: Arc<RecordingReporter>,
}

impl Harness {
    pub fn new(records: Vec<SyncableEntity>) -> Self {
        Self::with_transport(records, MockTransport::new())
    }

    pub fn with_transport(records: Vec<SyncableEntity>, transport: MockTransport) -> Self {
        Self {
            store: Arc::new(CountingStore::with_records(records)),
            transport: Arc::new(transport),
            connectivity: Arc::new(ManualConnectivity::online()),
            preferences: Arc::new(MemoryKeyValueStore::new()),
            reporter: Arc::new(RecordingReporter::default()),
        }
    }

    pub fn offline(self) -> Self {
        self.connectivity.set(NetworkAccess::None);
        self
    }

    pub async fn engine(&self) -> SyncEngine {
        self.engine_with_config(SyncConfig::default()).await
    }

    pub async fn engine_with_config(&self, config: SyncConfig) -> SyncEngine {
        SyncEngine::new(
            self.store.clone(),
            self.transport.clone(),
            self.connectivity.clone(),
            self.preferences.clone(),
            config,
        )
        .await
        .unwrap()
        .with_error_reporter(self.reporter.clone())
    }

    pub async fn stored(&self, kind: EntityKind, id: &str) -> Option<SyncableEntity> {
        self.store
            .inner
            .get(kind, &EntityId::new(id).unwrap())
            .await
    }
}

/// Record of the given kind, never synced.
pub fn record(kind: EntityKind, id: &str) -> SyncableEntity {
    SyncableEntity::new(
        kind,
        EntityId::new(id).unwrap(),
        serde_json::json!({ "name": id }),
    )
}

/// Downloaded item of the given raw kind.
pub fn remote_item(kind: &str, id: &str) -> RemoteItem {
    RemoteItem {
        kind: kind.to_string(),
        id: id.to_string(),
        last_modified: Utc::now(),
        payload: serde_json::json!({ "name": id, "from": "server" }),
    }
}

/// Every event currently buffered in `rx`.
pub fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
