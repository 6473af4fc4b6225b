//! Active storage backend selection.

use serde::Serialize;
use std::sync::{Arc, Mutex};

use super::signals::StorageDependencies;
use crate::storage::{
    CacheOnlyLayoutStorage, LayoutStorage, ReconcilingLayoutStorage, ReconcilingStorage,
};

/// Which adapter serves layout requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    CacheOnly,
    Reconciling,
}

impl BackendKind {
    /// Reconciling only when remote layouts are enabled and a session exists.
    pub fn select(remote_layouts_enabled: bool, session_present: bool) -> Self {
        if remote_layouts_enabled && session_present {
            BackendKind::Reconciling
        } else {
            BackendKind::CacheOnly
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::CacheOnly => write!(f, "cache-only"),
            BackendKind::Reconciling => write!(f, "reconciling"),
        }
    }
}

/// The storage backend currently serving layout CRUD.
#[derive(Clone)]
pub enum ActiveBackend {
    CacheOnly(Arc<CacheOnlyLayoutStorage>),
    Reconciling(Arc<ReconcilingLayoutStorage>),
}

impl ActiveBackend {
    pub fn kind(&self) -> BackendKind {
        match self {
            ActiveBackend::CacheOnly(_) => BackendKind::CacheOnly,
            ActiveBackend::Reconciling(_) => BackendKind::Reconciling,
        }
    }

    pub fn storage(&self) -> Arc<dyn LayoutStorage> {
        match self {
            ActiveBackend::CacheOnly(storage) => storage.clone() as Arc<dyn LayoutStorage>,
            ActiveBackend::Reconciling(storage) => storage.clone() as Arc<dyn LayoutStorage>,
        }
    }

    /// The reconciliation entry point, if this backend has one.
    pub fn reconciler(&self) -> Option<Arc<dyn ReconcilingStorage>> {
        match self {
            ActiveBackend::CacheOnly(_) => None,
            ActiveBackend::Reconciling(storage) => {
                Some(storage.clone() as Arc<dyn ReconcilingStorage>)
            }
        }
    }

    /// True if both refer to the same adapter instance.
    pub fn same_instance(&self, other: &ActiveBackend) -> bool {
        match (self, other) {
            (ActiveBackend::CacheOnly(a), ActiveBackend::CacheOnly(b)) => Arc::ptr_eq(a, b),
            (ActiveBackend::Reconciling(a), ActiveBackend::Reconciling(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for ActiveBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ActiveBackend({})", self.kind())
    }
}

/// Compares the data pointers of two trait objects, ignoring vtables.
fn same_object<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

struct Adapters {
    dependencies: StorageDependencies,
    cache_only: Arc<CacheOnlyLayoutStorage>,
    reconciling: Arc<ReconcilingLayoutStorage>,
}

impl Adapters {
    fn build(dependencies: &StorageDependencies) -> Self {
        Self {
            dependencies: dependencies.clone(),
            cache_only: Arc::new(CacheOnlyLayoutStorage::new(dependencies.cache.clone())),
            reconciling: Arc::new(ReconcilingLayoutStorage::new(
                dependencies.cache.clone(),
                dependencies.remote.clone(),
            )),
        }
    }

    /// Rebuilds only the adapters whose dependencies changed identity.
    fn refresh(&mut self, dependencies: &StorageDependencies) {
        let cache_changed = !same_object(&self.dependencies.cache, &dependencies.cache);
        let remote_changed = !same_object(&self.dependencies.remote, &dependencies.remote);

        if cache_changed {
            tracing::debug!("Layout cache changed, rebuilding storage adapters");
            *self = Self::build(dependencies);
        } else if remote_changed {
            tracing::debug!("Remote store changed, rebuilding reconciling adapter");
            self.dependencies.remote = dependencies.remote.clone();
            self.reconciling = Arc::new(ReconcilingLayoutStorage::new(
                dependencies.cache.clone(),
                dependencies.remote.clone(),
            ));
        }
    }
}

/// Chooses the active backend from the feature flag and session presence.
///
/// Adapter instances are memoized by dependency identity, so the same inputs
/// always yield the same instance.
#[derive(Default)]
pub struct BackendSelector {
    adapters: Mutex<Option<Adapters>>,
}

impl BackendSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(
        &self,
        dependencies: &StorageDependencies,
        remote_layouts_enabled: bool,
        session_present: bool,
    ) -> ActiveBackend {
        let mut guard = self.adapters.lock().unwrap_or_else(|e| e.into_inner());
        let adapters = guard.get_or_insert_with(|| Adapters::build(dependencies));
        adapters.refresh(dependencies);

        match BackendKind::select(remote_layouts_enabled, session_present) {
            BackendKind::CacheOnly => ActiveBackend::CacheOnly(adapters.cache_only.clone()),
            BackendKind::Reconciling => ActiveBackend::Reconciling(adapters.reconciling.clone()),
        }
    }
}
