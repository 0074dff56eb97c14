//! Automatic sync when connectivity comes back.

use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::connectivity::NetworkAccess;
use crate::engine::SyncEngine;

/// Background task that syncs after every offline to online transition.
///
/// Dropping the handle leaves the task running; call [`AutoSync::shutdown`]
/// to stop it.
pub struct AutoSync {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl AutoSync {
    /// Start watching the engine's connectivity monitor.
    ///
    /// The state at the time of the call is the baseline; only later
    /// transitions trigger a sync.
    pub fn spawn(engine: Arc<SyncEngine>) -> Self {
        let access = engine.connectivity().subscribe();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(engine, access, shutdown_rx));

        Self {
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }

    /// Stop watching and wait for the task to finish.
    ///
    /// A sync already triggered keeps running to completion.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!("Auto-sync task ended abnormally: {}", e);
        }
    }
}

async fn run(
    engine: Arc<SyncEngine>,
    mut access: watch::Receiver<NetworkAccess>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut previous = *access.borrow_and_update();
    info!("Auto-sync started ({:?})", previous);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("Auto-sync shutting down");
                break;
            }
            changed = access.changed() => {
                if changed.is_err() {
                    debug!("Connectivity monitor gone, stopping auto-sync");
                    break;
                }
                let current = *access.borrow_and_update();
                if previous != NetworkAccess::Internet && current == NetworkAccess::Internet {
                    trigger(engine.clone());
                }
                previous = current;
            }
        }
    }
}

/// Wait for the connection to settle, then run an unforced sync.
fn trigger(engine: Arc<SyncEngine>) {
    let delay = engine.config().settle_delay();
    info!("Connectivity restored, syncing in {:?}", delay);

    tokio::spawn(async move {
        sleep(delay).await;
        match engine.sync(false).await {
            Ok(result) if result.success => {
                info!("Auto-sync completed: {} items", result.items_synced);
            }
            Ok(result) => {
                info!(
                    "Auto-sync did not run: {}",
                    result.error_message.unwrap_or_default()
                );
            }
            Err(e) => {
                error!("Auto-sync failed: {}", e);
            }
        }
    });
}
