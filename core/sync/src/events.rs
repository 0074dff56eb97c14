//! Lifecycle events published to the UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// A sync lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    Started {
        started_at: DateTime<Utc>,
    },
    Completed {
        completed_at: DateTime<Utc>,
        items_synced: usize,
    },
    Failed {
        error: String,
    },
}

/// Broadcast channel the engine publishes events to.
///
/// Publishing never blocks and never fails; events sent while nobody is
/// subscribed are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to every current subscriber.
    pub fn publish(&self, event: SyncEvent) {
        trace!(?event, "Publishing sync event");
        let _ = self.tx.send(event);
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
