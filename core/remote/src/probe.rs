//! Connectivity detection by periodic TCP probe.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info};

use budgetsync_sync::{ConnectivityMonitor, NetworkAccess};

/// Probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// `host:port` to connect to.
    pub address: String,
    /// Connect timeout in milliseconds.
    pub timeout_ms: u64,
    /// Time between probes in milliseconds.
    pub interval_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            address: "1.1.1.1:443".to_string(),
            timeout_ms: 3_000,
            interval_ms: 15_000,
        }
    }
}

/// Try to open a TCP connection within `limit`.
pub async fn probe(address: &str, limit: Duration) -> NetworkAccess {
    match timeout(limit, TcpStream::connect(address)).await {
        Ok(Ok(_)) => NetworkAccess::Internet,
        Ok(Err(e)) => {
            debug!("Probe of {} failed: {}", address, e);
            NetworkAccess::None
        }
        Err(_) => {
            debug!("Probe of {} timed out", address);
            NetworkAccess::None
        }
    }
}

/// Connectivity monitor fed by periodic TCP probes.
pub struct ProbeConnectivityMonitor {
    tx: watch::Sender<NetworkAccess>,
    config: ProbeConfig,
}

impl ProbeConnectivityMonitor {
    /// Probe once, then keep probing in the background.
    ///
    /// The returned task runs until aborted.
    pub async fn start(config: ProbeConfig) -> (Arc<Self>, JoinHandle<()>) {
        let initial = probe(&config.address, Duration::from_millis(config.timeout_ms)).await;
        info!("Initial network access: {:?}", initial);

        let (tx, _) = watch::channel(initial);
        let monitor = Arc::new(Self { tx, config });

        let task = tokio::spawn({
            let monitor = monitor.clone();
            async move {
                let mut ticker = interval(Duration::from_millis(monitor.config.interval_ms.max(1)));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // First tick completes immediately
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    monitor.check().await;
                }
            }
        });

        (monitor, task)
    }

    /// Probe now and publish the result if it changed.
    pub async fn check(&self) -> NetworkAccess {
        let access = probe(
            &self.config.address,
            Duration::from_millis(self.config.timeout_ms),
        )
        .await;

        let changed = self.tx.send_if_modified(|current| {
            if *current == access {
                false
            } else {
                *current = access;
                true
            }
        });
        if changed {
            info!("Network access changed to {:?}", access);
        }
        access
    }
}

impl ConnectivityMonitor for ProbeConnectivityMonitor {
    fn network_access(&self) -> NetworkAccess {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<NetworkAccess> {
        self.tx.subscribe()
    }
}
