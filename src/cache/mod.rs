//! Local repository cache.
//!
//! This module provides the full-replace store the sync loop writes to:
//! - An in-memory snapshot swapped atomically on every successful refresh
//! - Predicate lookups over the current snapshot
//! - Optional write-through to SQLite so the snapshot survives restarts

mod storage;
mod store;

pub use storage::SqliteStorage;
pub use store::{RepositoryCache, Snapshot};
