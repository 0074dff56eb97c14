//! Common utilities and types shared across BudgetSync modules.
//!
//! This module provides the error taxonomy and the domain types that the
//! local store, the sync engine and the remote transport agree on.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{EntityId, EntityKind, SyncableEntity};
