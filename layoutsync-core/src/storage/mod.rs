//! Storage backends that serve layout CRUD requests.
//!
//! Two adapters implement [`LayoutStorage`]:
//! - [`CacheOnlyLayoutStorage`] exposes the local cache directly.
//! - [`ReconcilingLayoutStorage`] tracks local changes and can reconcile them
//!   with the remote store.
//!
//! Callers only ever see the [`LayoutStorage`] surface, so switching the
//! active backend never changes what a read or write looks like.

mod cache_only;
mod reconciling;

use async_trait::async_trait;
use thiserror::Error;

use crate::cache::CacheError;
use crate::layout::{Layout, LayoutId, LayoutUpdate, NewLayout};

pub use cache_only::CacheOnlyLayoutStorage;
pub use reconciling::{ConflictKind, LayoutConflict, ReconcileError, ReconcilingLayoutStorage};

/// Errors returned by layout storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Layout not found: {0}")]
    NotFound(LayoutId),
}

/// Unified CRUD surface for layouts.
#[async_trait]
pub trait LayoutStorage: Send + Sync {
    /// Lists all visible layouts, sorted by name.
    async fn list_layouts(&self) -> Result<Vec<Layout>, StorageError>;

    async fn get_layout(&self, id: LayoutId) -> Result<Option<Layout>, StorageError>;

    async fn save_new_layout(&self, layout: NewLayout) -> Result<Layout, StorageError>;

    async fn update_layout(&self, update: LayoutUpdate) -> Result<Layout, StorageError>;

    async fn delete_layout(&self, id: LayoutId) -> Result<(), StorageError>;
}

/// A layout storage that can reconcile with the remote service.
///
/// `reconcile` must be safe to call concurrently: overlapping calls each leave
/// the cache and remote in a consistent state.
#[async_trait]
pub trait ReconcilingStorage: LayoutStorage {
    /// Runs one bidirectional sync pass and returns the layouts that could not
    /// be merged automatically.
    async fn reconcile(&self) -> Result<Vec<LayoutConflict>, ReconcileError>;
}
