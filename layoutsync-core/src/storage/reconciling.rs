//! Offline-first layout storage that reconciles with the remote store.
//!
//! Reads and writes always go to the local cache, so the storage works without
//! a network. Each entry carries a [`SyncState`] recording the remote version
//! it was last reconciled against (its baseline) and whether it changed
//! locally since. [`ReconcilingLayoutStorage::reconcile`] walks the union of
//! local and remote layouts and, per layout:
//!
//! - pulls remote changes into clean local copies,
//! - pushes local changes whose remote copy is still at the baseline,
//! - propagates deletions in both directions,
//! - reports a [`LayoutConflict`] when both sides changed.
//!
//! Conflicted layouts are left untouched on both sides.
//!
//! Local writes and the pass's cache updates share one write lock, so every
//! compare-then-write the pass makes is atomic with respect to local edits.
//! The lock is never held across a remote call.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use super::{CacheOnlyLayoutStorage, LayoutStorage, ReconcilingStorage, StorageError};
use crate::cache::{CacheError, CachedLayout, LayoutCache, SyncState};
use crate::layout::{Layout, LayoutId, LayoutUpdate, NewLayout};
use crate::remote::{RemoteError, RemoteLayout, RemoteLayoutStore};

/// Errors that abort a reconciliation pass.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// How the local and remote copies of a layout diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    /// Changed on both sides since the last reconciliation.
    BothUpdated,
    /// Changed locally, deleted remotely.
    LocalUpdateRemoteDelete,
    /// Deleted locally, changed remotely.
    LocalDeleteRemoteUpdate,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::BothUpdated => write!(f, "updated locally and remotely"),
            ConflictKind::LocalUpdateRemoteDelete => {
                write!(f, "updated locally, deleted remotely")
            }
            ConflictKind::LocalDeleteRemoteUpdate => {
                write!(f, "deleted locally, updated remotely")
            }
        }
    }
}

/// A layout that reconciliation could not merge automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutConflict {
    pub id: LayoutId,
    pub name: String,
    pub kind: ConflictKind,
}

impl std::fmt::Display for LayoutConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.id, self.kind)
    }
}

/// Layout storage over the local cache with remote reconciliation.
pub struct ReconcilingLayoutStorage {
    local: CacheOnlyLayoutStorage,
    cache: Arc<dyn LayoutCache>,
    remote: Arc<dyn RemoteLayoutStore>,
    reconcile_lock: Mutex<()>,
    write_lock: Mutex<()>,
}

impl ReconcilingLayoutStorage {
    pub fn new(cache: Arc<dyn LayoutCache>, remote: Arc<dyn RemoteLayoutStore>) -> Self {
        Self {
            local: CacheOnlyLayoutStorage::new(cache.clone()),
            cache,
            remote,
            reconcile_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
        }
    }

    /// Reconciles one cached entry against its remote copy, if any.
    async fn reconcile_entry(
        &self,
        entry: &CachedLayout,
        remote: Option<RemoteLayout>,
    ) -> Result<Option<ConflictKind>, ReconcileError> {
        let id = entry.id();
        let sync = &entry.sync;

        match (sync.baseline, remote) {
            (_, None) if sync.locally_deleted => {
                tracing::debug!("Layout {} deleted on both sides, purging tombstone", id);
                self.replace_if_unchanged(entry, None).await?;
                Ok(None)
            }
            (None, None) => {
                tracing::debug!("Uploading new layout {}", id);
                match self.remote.create(&entry.layout).await {
                    Ok(created) => {
                        self.record_push(entry, created).await?;
                        Ok(None)
                    }
                    Err(RemoteError::PreconditionFailed(_)) => Ok(Some(ConflictKind::BothUpdated)),
                    Err(e) => Err(e.into()),
                }
            }
            (Some(_), None) if sync.locally_modified => {
                Ok(Some(ConflictKind::LocalUpdateRemoteDelete))
            }
            (Some(_), None) => {
                tracing::debug!("Layout {} deleted remotely, removing local copy", id);
                self.replace_if_unchanged(entry, None).await?;
                Ok(None)
            }
            (None, Some(remote)) if sync.locally_deleted => {
                self.replace_if_unchanged(entry, Some(pulled(remote))).await?;
                Ok(None)
            }
            (None, Some(_)) => Ok(Some(ConflictKind::BothUpdated)),
            (Some(baseline), Some(remote)) => {
                let remote_changed = remote.updated_at != baseline;

                if sync.locally_deleted {
                    if remote_changed {
                        return Ok(Some(ConflictKind::LocalDeleteRemoteUpdate));
                    }
                    tracing::debug!("Deleting layout {} remotely", id);
                    match self.remote.delete(id, Some(baseline)).await {
                        Ok(_) => {
                            self.replace_if_unchanged(entry, None).await?;
                            Ok(None)
                        }
                        Err(RemoteError::PreconditionFailed(_)) => {
                            Ok(Some(ConflictKind::LocalDeleteRemoteUpdate))
                        }
                        Err(e) => Err(e.into()),
                    }
                } else if sync.locally_modified {
                    if remote_changed {
                        return Ok(Some(ConflictKind::BothUpdated));
                    }
                    tracing::debug!("Uploading changes to layout {}", id);
                    match self.remote.update(&entry.layout, Some(baseline)).await {
                        Ok(updated) => {
                            self.record_push(entry, updated).await?;
                            Ok(None)
                        }
                        Err(RemoteError::PreconditionFailed(_)) => {
                            Ok(Some(ConflictKind::BothUpdated))
                        }
                        Err(RemoteError::NotFound(_)) => {
                            Ok(Some(ConflictKind::LocalUpdateRemoteDelete))
                        }
                        Err(e) => Err(e.into()),
                    }
                } else if remote_changed {
                    tracing::debug!("Pulling remote changes to layout {}", id);
                    self.replace_if_unchanged(entry, Some(pulled(remote))).await?;
                    Ok(None)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Writes `replacement` (or deletes, if `None`) only if the cached entry is
    /// still exactly `snapshot`. A local write that raced the pass wins and is
    /// picked up by the next pass.
    async fn replace_if_unchanged(
        &self,
        snapshot: &CachedLayout,
        replacement: Option<CachedLayout>,
    ) -> Result<bool, CacheError> {
        let _write = self.write_lock.lock().await;
        let current = self.cache.get(snapshot.id()).await?;
        if current.as_ref() != Some(snapshot) {
            tracing::debug!(
                "Layout {} changed locally during sync, deferring",
                snapshot.id()
            );
            return Ok(false);
        }

        match replacement {
            Some(entry) => {
                self.cache.put(entry).await?;
            }
            None => self.cache.delete(snapshot.id()).await?,
        }
        Ok(true)
    }

    /// Records a successful upload of `snapshot` that produced `remote`.
    async fn record_push(
        &self,
        snapshot: &CachedLayout,
        remote: RemoteLayout,
    ) -> Result<(), CacheError> {
        let baseline = remote.updated_at;

        let _write = self.write_lock.lock().await;
        match self.cache.get(snapshot.id()).await? {
            Some(current) if &current == snapshot => {
                self.cache.put(pulled(remote)).await?;
            }
            Some(mut current) => {
                // Edited again while uploading: keep the edit, advance the baseline.
                current.sync.baseline = Some(baseline);
                self.cache.put(current).await?;
            }
            None => {
                // Deleted while uploading: leave a tombstone so the next pass
                // removes the copy we just created.
                self.cache
                    .put(CachedLayout {
                        layout: remote.into(),
                        sync: SyncState {
                            baseline: Some(baseline),
                            locally_modified: false,
                            locally_deleted: true,
                        },
                    })
                    .await?;
            }
        }
        Ok(())
    }
}

/// A clean cache entry mirroring `remote`.
fn pulled(remote: RemoteLayout) -> CachedLayout {
    let baseline = remote.updated_at;
    CachedLayout {
        layout: remote.into(),
        sync: SyncState::synced(baseline),
    }
}

#[async_trait]
impl LayoutStorage for ReconcilingLayoutStorage {
    async fn list_layouts(&self) -> Result<Vec<Layout>, StorageError> {
        self.local.list_layouts().await
    }

    async fn get_layout(&self, id: LayoutId) -> Result<Option<Layout>, StorageError> {
        self.local.get_layout(id).await
    }

    async fn save_new_layout(&self, layout: NewLayout) -> Result<Layout, StorageError> {
        let _write = self.write_lock.lock().await;
        self.local.save_new_layout(layout).await
    }

    async fn update_layout(&self, update: LayoutUpdate) -> Result<Layout, StorageError> {
        let _write = self.write_lock.lock().await;
        self.local.update_layout(update).await
    }

    async fn delete_layout(&self, id: LayoutId) -> Result<(), StorageError> {
        let _write = self.write_lock.lock().await;
        let Some(mut entry) = self.cache.get(id).await? else {
            return Ok(());
        };

        if entry.sync.baseline.is_none() {
            self.cache.delete(id).await?;
        } else {
            entry.sync.locally_deleted = true;
            self.cache.put(entry).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ReconcilingStorage for ReconcilingLayoutStorage {
    async fn reconcile(&self) -> Result<Vec<LayoutConflict>, ReconcileError> {
        let _guard = self.reconcile_lock.lock().await;

        let mut remote_layouts: HashMap<LayoutId, RemoteLayout> = self
            .remote
            .list()
            .await?
            .into_iter()
            .map(|layout| (layout.id, layout))
            .collect();
        let local_layouts = self.cache.list().await?;

        let mut conflicts = Vec::new();
        for entry in &local_layouts {
            let remote = remote_layouts.remove(&entry.id());
            if let Some(kind) = self.reconcile_entry(entry, remote).await? {
                conflicts.push(LayoutConflict {
                    id: entry.id(),
                    name: entry.layout.name.clone(),
                    kind,
                });
            }
        }

        // Remaining remote layouts have no local copy yet
        for (id, remote) in remote_layouts {
            let _write = self.write_lock.lock().await;
            if self.cache.get(id).await?.is_none() {
                tracing::debug!("Pulling new remote layout {}", id);
                self.cache.put(pulled(remote)).await?;
            }
        }

        conflicts.sort_by_key(|c| c.id);
        Ok(conflicts)
    }
}
