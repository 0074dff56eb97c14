//! Local storage abstraction for BudgetSync.
//!
//! This module provides the trait-based interfaces the sync engine consumes
//! for on-device records and preferences, plus two implementations.
//!
//! # Design Principles
//! - Store isolation: no sync logic lives in a store
//! - Async operations: all store calls are async
//! - Unified error semantics: every backend reports `Error::Storage`

pub mod memory;
pub mod sqlite;
pub mod store;

pub use memory::{MemoryKeyValueStore, MemoryStore};
pub use sqlite::SqliteStore;
pub use store::{KeyValueStore, LocalStore, LAST_SYNC_AT_KEY};
