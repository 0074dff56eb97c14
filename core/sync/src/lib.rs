//! BudgetSync Sync Engine
//!
//! This crate keeps the on-device store and the hosted sync service in step:
//! - Upload of unsynced and recently modified records
//! - Download of server changes since the last successful sync
//! - Server-wins conflict resolution, overridable per record kind
//! - Fixed-schedule retry of transient failures
//! - Automatic sync when connectivity comes back

pub mod batch;
pub mod conflict;
pub mod connectivity;
pub mod engine;
pub mod events;
pub mod reporter;
pub mod retry;
pub mod scheduler;
pub mod state;
pub mod transport;

#[cfg(test)]
mod test_support;

// Re-export main types
pub use batch::SyncBatch;
pub use conflict::{ConflictInfo, ConflictResolution, ConflictResolver, ConflictStrategy};
pub use connectivity::{ConnectivityMonitor, ManualConnectivity, NetworkAccess};
pub use engine::{DownloadAction, SyncConfig, SyncEngine};
pub use events::{EventBus, SyncEvent};
pub use reporter::{user_message, ErrorContext, ErrorReporter, TracingErrorReporter};
pub use retry::{RetryConfig, RetryError, RetryExecutor};
pub use scheduler::AutoSync;
pub use state::{SyncResult, SyncStatus};
pub use transport::{
    DownloadData, DownloadResponse, RemoteItem, RemoteTransport, UploadData, UploadResponse,
};
