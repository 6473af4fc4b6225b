//! Layout Sync Core Library
//!
//! Local and remote layout storage, and the controller that keeps them in sync.

pub mod cache;
pub mod controller;
pub mod layout;
pub mod remote;
pub mod storage;

pub use cache::{
    CacheError, CachedLayout, LayoutCache, MemoryLayoutCache, SqliteLayoutCache, SyncState,
};
pub use controller::{
    ActiveBackend, BackendKind, BuildMode, ControllerOptions, ControllerState, DebugHandle,
    EnvironmentSignals, LogNotifier, NotificationSink, Session, StorageDependencies,
    SyncController, SyncInvoker, SyncOutcome, SYNC_INTERVAL,
};
pub use layout::{Layout, LayoutId, LayoutIdError, LayoutUpdate, NewLayout};
pub use remote::{
    check_server, HttpRemoteLayoutStore, MemoryRemoteLayoutStore, RemoteError, RemoteLayout,
    RemoteLayoutStore,
};
pub use storage::{
    CacheOnlyLayoutStorage, ConflictKind, LayoutConflict, LayoutStorage, ReconcileError,
    ReconcilingLayoutStorage, ReconcilingStorage, StorageError,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
