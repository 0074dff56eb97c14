//! Core sync engine that orchestrates all sync operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use budgetsync_common::{EntityKind, Error, Result};
use budgetsync_storage::{KeyValueStore, LocalStore, LAST_SYNC_AT_KEY};

use crate::batch::SyncBatch;
use crate::conflict::{ConflictInfo, ConflictResolver, ConflictStrategy};
use crate::connectivity::ConnectivityMonitor;
use crate::events::{EventBus, SyncEvent, DEFAULT_EVENT_CAPACITY};
use crate::reporter::{ErrorContext, ErrorReporter, TracingErrorReporter};
use crate::retry::{RetryConfig, RetryExecutor, DEFAULT_MAX_ATTEMPTS, RETRY_SCHEDULE};
use crate::state::{
    decode_watermark, encode_watermark, SyncResult, SyncStatus, ALREADY_SYNCING, NO_CONNECTIVITY,
};
use crate::transport::RemoteTransport;

/// What the download phase does with records of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadAction {
    /// Mark synced and write into the local store.
    Apply,
    /// Ignore.
    Skip,
}

/// Largest accepted event buffer.
pub const MAX_EVENT_CAPACITY: usize = 1 << 16;

/// Configuration for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum age of the watermark before an unforced sync hits the network.
    pub staleness_window_secs: u64,
    /// Attempts per sync request, the first one included.
    pub retry_attempts: u32,
    /// Delay after each failed attempt, in milliseconds.
    pub retry_delays_ms: Vec<u64>,
    /// Wait between connectivity coming back and the automatic sync.
    pub settle_delay_ms: u64,
    /// Kinds collected for upload, in order.
    pub tracked_kinds: Vec<EntityKind>,
    /// Handling of downloaded records per kind. Missing kinds are skipped.
    pub download_actions: BTreeMap<EntityKind, DownloadAction>,
    /// Conflict strategy per kind. Missing kinds use server-wins.
    pub conflict_overrides: BTreeMap<EntityKind, ConflictStrategy>,
    /// Events buffered per subscriber.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        // Budgets and goals have no synced flag and are not applied on
        // download; kept that way until the server contract covers them.
        let download_actions = BTreeMap::from([
            (EntityKind::Account, DownloadAction::Apply),
            (EntityKind::Transaction, DownloadAction::Apply),
            (EntityKind::Budget, DownloadAction::Skip),
            (EntityKind::Goal, DownloadAction::Skip),
        ]);

        Self {
            staleness_window_secs: 5 * 60,
            retry_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delays_ms: RETRY_SCHEDULE.iter().map(|d| d.as_millis() as u64).collect(),
            settle_delay_ms: 2_000,
            tracked_kinds: EntityKind::ALL.to_vec(),
            download_actions,
            conflict_overrides: BTreeMap::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Check values that cannot be represented at runtime.
    ///
    /// # Errors
    /// - `Error::Config` naming the offending field
    pub fn validate(&self) -> Result<()> {
        if checked_window(self.staleness_window_secs).is_none() {
            return Err(Error::Config(format!(
                "staleness_window_secs out of range: {}",
                self.staleness_window_secs
            )));
        }
        if self.event_capacity > MAX_EVENT_CAPACITY {
            return Err(Error::Config(format!(
                "event_capacity must be at most {}, got {}",
                MAX_EVENT_CAPACITY, self.event_capacity
            )));
        }
        Ok(())
    }

    /// Staleness window, saturating at the largest representable duration.
    pub fn staleness_window(&self) -> chrono::Duration {
        checked_window(self.staleness_window_secs).unwrap_or(chrono::Duration::MAX)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.retry_attempts).with_delays(
            self.retry_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        )
    }

    pub fn conflict_resolver(&self) -> ConflictResolver {
        self.conflict_overrides
            .iter()
            .fold(ConflictResolver::default(), |resolver, (kind, strategy)| {
                resolver.with_override(*kind, *strategy)
            })
    }

    pub fn download_action(&self, kind: EntityKind) -> DownloadAction {
        self.download_actions
            .get(&kind)
            .copied()
            .unwrap_or(DownloadAction::Skip)
    }
}

fn checked_window(secs: u64) -> Option<chrono::Duration> {
    i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
}

/// Exclusive hold on the syncing flag, released on drop.
struct SyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Result of the upload phase.
enum UploadOutcome {
    /// No eligible records; nothing was sent.
    NothingToUpload,
    /// The server accepted the batch.
    Uploaded {
        batch: SyncBatch,
        items_synced: usize,
        conflicts: Vec<ConflictInfo>,
    },
    /// The server answered but refused the batch.
    Declined(String),
}

/// Result of the download phase.
enum DownloadOutcome {
    Applied(usize),
    Declined(String),
}

/// Offline-first sync engine between the local store and the remote service.
///
/// One engine owns one watermark and allows at most one sync in flight.
/// Share it as `Arc<SyncEngine>`.
pub struct SyncEngine {
    /// On-device records.
    store: Arc<dyn LocalStore>,
    /// Hosted sync service.
    transport: Arc<dyn RemoteTransport>,
    /// Online/offline state.
    connectivity: Arc<dyn ConnectivityMonitor>,
    /// Durable home of the watermark.
    preferences: Arc<dyn KeyValueStore>,
    /// Failure sink.
    reporter: Arc<dyn ErrorReporter>,
    /// Last successful sync completion.
    watermark: RwLock<Option<DateTime<Utc>>>,
    /// Set while a sync request is running.
    syncing: AtomicBool,
    conflict_resolver: ConflictResolver,
    retry_executor: RetryExecutor,
    events: EventBus,
    config: SyncConfig,
}

impl SyncEngine {
    /// Create a new sync engine, loading the persisted watermark.
    ///
    /// # Errors
    /// - Invalid configuration (see [`SyncConfig::validate`])
    /// - Preference store read failure
    pub async fn new(
        store: Arc<dyn LocalStore>,
        transport: Arc<dyn RemoteTransport>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        preferences: Arc<dyn KeyValueStore>,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;

        let watermark = match preferences.get(LAST_SYNC_AT_KEY).await? {
            Some(raw) => {
                let parsed = decode_watermark(&raw);
                if parsed.is_none() {
                    warn!("Ignoring unparseable {} value: {:?}", LAST_SYNC_AT_KEY, raw);
                }
                parsed
            }
            None => None,
        };

        let conflict_resolver = config.conflict_resolver();
        let retry_executor = RetryExecutor::new(config.retry_config());
        debug!(
            "Sync engine created on {} store: last sync {:?}, {} attempts, conflicts default to {}",
            store.name(),
            watermark,
            retry_executor.config().max_attempts,
            conflict_resolver.default_strategy().as_str()
        );

        Ok(Self {
            store,
            transport,
            connectivity,
            preferences,
            reporter: Arc::new(TracingErrorReporter),
            watermark: RwLock::new(watermark),
            syncing: AtomicBool::new(false),
            conflict_resolver,
            retry_executor,
            events: EventBus::new(config.event_capacity),
            config,
        })
    }

    /// Replace the default tracing reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Get the connectivity monitor.
    pub fn connectivity(&self) -> Arc<dyn ConnectivityMonitor> {
        self.connectivity.clone()
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Last successful sync completion, if any.
    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        *self
            .watermark
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_watermark(&self, value: Option<DateTime<Utc>>) {
        *self
            .watermark
            .write()
            .unwrap_or_else(PoisonError::into_inner) = value;
    }

    /// Whether a sync request is running.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Current status snapshot.
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            is_syncing: self.is_syncing(),
            last_sync_at: self.last_sync_at(),
            has_connectivity: self.connectivity.has_internet(),
        }
    }

    /// Forget the watermark so the next sync is a full one.
    pub async fn clear_sync_cache(&self) -> Result<()> {
        self.preferences.remove(LAST_SYNC_AT_KEY).await?;
        self.set_watermark(None);
        info!("Sync cache cleared");
        Ok(())
    }

    /// Run one sync request: upload, download, resolve conflicts, commit.
    ///
    /// Precondition failures (already syncing, offline) and server refusals
    /// come back as `Ok` with `success == false`. Without `force`, a request
    /// within the staleness window of the last sync returns a zero-item
    /// success without network calls.
    ///
    /// # Errors
    /// - Non-transient failure of an attempt, after reporting it
    /// - The last transient failure once all attempts are used up
    pub async fn sync(&self, force: bool) -> Result<SyncResult> {
        if self.is_syncing() {
            debug!("Sync requested while another is running");
            return Ok(SyncResult::failed(ALREADY_SYNCING));
        }

        if !self.connectivity.has_internet() {
            info!("Skipping sync: offline");
            return Ok(SyncResult::failed(NO_CONNECTIVITY));
        }

        if !force {
            if let Some(last) = self.last_sync_at() {
                if Utc::now() - last < self.config.staleness_window() {
                    debug!("Last sync at {} is recent, skipping", last);
                    return Ok(SyncResult::success(0, last));
                }
            }
        }

        let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
            debug!("Lost the race for the sync guard");
            return Ok(SyncResult::failed(ALREADY_SYNCING));
        };

        let started_at = Utc::now();
        info!("Starting sync (force: {})", force);
        self.events.publish(SyncEvent::Started { started_at });

        match self.retry_executor.execute(|| self.attempt()).await {
            Ok(result) if result.success => {
                info!(
                    "Sync completed in {}ms: {} items",
                    (Utc::now() - started_at).num_milliseconds(),
                    result.items_synced
                );
                self.events.publish(SyncEvent::Completed {
                    completed_at: result.completed_at.unwrap_or_else(Utc::now),
                    items_synced: result.items_synced,
                });
                Ok(result)
            }
            Ok(result) => {
                let error = result
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Sync failed".to_string());
                warn!("Sync refused by server: {}", error);
                self.events.publish(SyncEvent::Failed { error });
                Ok(result)
            }
            Err(failure) => {
                self.reporter.report(failure.context(), failure.error()).await;
                self.events.publish(SyncEvent::Failed {
                    error: failure.error().to_string(),
                });
                Err(failure.into_error())
            }
        }
    }

    /// One attempt, with its failure forwarded to the server log.
    async fn attempt(&self) -> Result<SyncResult> {
        let result = self.run_attempt().await;
        if let Err(e) = &result {
            let context = ErrorContext::Sync.as_str();
            if let Err(log_err) = self.transport.log_error(context, &e.to_string()).await {
                debug!("Could not forward error to server: {}", log_err);
            }
        }
        result
    }

    async fn run_attempt(&self) -> Result<SyncResult> {
        // 1. Upload local changes
        let (batch, items_synced, conflicts) = match self.upload_local_changes().await? {
            UploadOutcome::NothingToUpload => (None, 0, Vec::new()),
            UploadOutcome::Uploaded {
                batch,
                items_synced,
                conflicts,
            } => (Some(batch), items_synced, conflicts),
            UploadOutcome::Declined(message) => {
                return Ok(SyncResult::failed(format!("Upload failed: {}", message)));
            }
        };

        // 2. Download remote changes
        match self.download_server_changes().await? {
            DownloadOutcome::Applied(applied) => {
                debug!("Applied {} downloaded records", applied);
            }
            DownloadOutcome::Declined(message) => {
                return Ok(SyncResult::failed(format!("Download failed: {}", message)));
            }
        }

        // 3. Resolve conflicts reported by the upload
        if let Some(batch) = batch.as_ref().filter(|_| !conflicts.is_empty()) {
            let resolutions = self.conflict_resolver.resolve(&conflicts, batch);
            info!("Resolving {} conflicts", resolutions.len());
            self.transport.resolve_conflicts(&resolutions).await?;
        }

        let completed_at = self.commit_watermark().await?;
        Ok(SyncResult::success(items_synced, completed_at))
    }

    /// Upload every eligible record and flag the accepted ones as synced.
    async fn upload_local_changes(&self) -> Result<UploadOutcome> {
        let watermark = self.last_sync_at();

        let mut candidates = Vec::new();
        for kind in &self.config.tracked_kinds {
            candidates.extend(self.store.list_all(*kind).await?);
        }

        let batch = SyncBatch::prepare(candidates, watermark);
        if batch.is_empty() {
            debug!("No local changes to upload");
            return Ok(UploadOutcome::NothingToUpload);
        }

        debug!("Uploading {} records", batch.len());
        let response = self.transport.upload(&batch).await?;
        if !response.success {
            return Ok(UploadOutcome::Declined(
                response
                    .error_message
                    .unwrap_or_else(|| "upload rejected".to_string()),
            ));
        }

        // Only the uploaded version is flagged; edits made meanwhile stay pending.
        for entity in batch.flag_tracked() {
            let flagged = self
                .store
                .mark_synced(entity.kind, &entity.id, entity.last_modified)
                .await?;
            if !flagged {
                debug!("{} {} changed during upload, left pending", entity.kind, entity.id);
            }
        }

        let data = response.data.unwrap_or_default();
        Ok(UploadOutcome::Uploaded {
            batch,
            items_synced: data.items_synced,
            conflicts: data.conflicts,
        })
    }

    /// Fetch records changed since the watermark and apply the known kinds.
    async fn download_server_changes(&self) -> Result<DownloadOutcome> {
        let since = self.last_sync_at();
        let response = self.transport.download(since).await?;
        if !response.success {
            return Ok(DownloadOutcome::Declined(
                response
                    .error_message
                    .unwrap_or_else(|| "download rejected".to_string()),
            ));
        }

        let items = response.data.map(|d| d.items).unwrap_or_default();
        let mut applied = 0;
        for item in items {
            let Some(kind) = item.entity_kind() else {
                debug!("Skipping downloaded item {} of unknown kind {}", item.id, item.kind);
                continue;
            };
            if self.config.download_action(kind) == DownloadAction::Skip {
                debug!("Skipping downloaded {} {}", kind, item.id);
                continue;
            }
            self.store.upsert(item.into_synced_entity(kind)?).await?;
            applied += 1;
        }

        Ok(DownloadOutcome::Applied(applied))
    }

    /// Advance the watermark to now and persist it.
    async fn commit_watermark(&self) -> Result<DateTime<Utc>> {
        let mut now = Utc::now();
        // The wall clock may step backwards; the watermark must not.
        if let Some(previous) = self.last_sync_at() {
            if now <= previous {
                now = previous + chrono::Duration::nanoseconds(1);
            }
        }

        self.preferences
            .set(LAST_SYNC_AT_KEY, &encode_watermark(now))
            .await?;
        self.set_watermark(Some(now));
        Ok(now)
    }
}
