//! Local layout cache.
//!
//! The cache persists layout documents on the device so they are available
//! without network access. It stores whatever it is given: change tracking
//! lives in [`SyncState`] and is interpreted by the storage adapters, never by
//! the cache itself.

mod memory;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::{Layout, LayoutId};

pub use memory::MemoryLayoutCache;
pub use sqlite::SqliteLayoutCache;

/// Errors that can occur during cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to (de)serialize cached layout: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt cache entry {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reconciliation bookkeeping for a cached layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Remote `updated_at` observed at the last successful reconciliation.
    /// `None` means the layout has never been synced.
    pub baseline: Option<DateTime<Utc>>,
    /// Changed locally since the last reconciliation.
    pub locally_modified: bool,
    /// Deleted locally; kept as a tombstone until the remote copy is removed.
    pub locally_deleted: bool,
}

impl SyncState {
    /// State of a layout that matches the remote copy at `baseline`.
    pub fn synced(baseline: DateTime<Utc>) -> Self {
        Self {
            baseline: Some(baseline),
            locally_modified: false,
            locally_deleted: false,
        }
    }
}

/// A layout together with its sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedLayout {
    pub layout: Layout,
    pub sync: SyncState,
}

impl CachedLayout {
    /// A layout created locally that has never been synced.
    pub fn local(layout: Layout) -> Self {
        Self {
            layout,
            sync: SyncState::default(),
        }
    }

    pub fn id(&self) -> LayoutId {
        self.layout.id
    }
}

/// Read/write/delete access to locally persisted layouts.
#[async_trait]
pub trait LayoutCache: Send + Sync {
    /// Returns every cached layout, tombstones included.
    async fn list(&self) -> Result<Vec<CachedLayout>, CacheError>;

    async fn get(&self, id: LayoutId) -> Result<Option<CachedLayout>, CacheError>;

    /// Inserts or replaces the entry for `entry.layout.id`.
    async fn put(&self, entry: CachedLayout) -> Result<CachedLayout, CacheError>;

    /// Removes the entry. Deleting a missing entry is not an error.
    async fn delete(&self, id: LayoutId) -> Result<(), CacheError>;
}
