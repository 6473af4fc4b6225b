//! Synchronization controller.
//!
//! The controller observes four inputs (remote-layouts feature flag, user
//! session, network reachability, document visibility) and derives:
//!
//! - the active storage backend: reconciling when the flag is on and a session
//!   exists, cache-only otherwise;
//! - the scheduling gate: session present, network reachable and document
//!   visible;
//! - a periodic sync that runs every [`SYNC_INTERVAL`] while the gate is open
//!   and the reconciling backend is active.
//!
//! Sync failures surface as a single notification under
//! [`SYNC_ERROR_NOTIFICATION_ID`]; conflicts are logged and returned, never
//! treated as failures.
//!
//! ```ignore
//! let signals = EnvironmentSignals::new(StorageDependencies::new(cache, remote));
//! let controller = SyncController::new(&signals, Arc::new(LogNotifier), ControllerOptions::default());
//! let storage = controller.active_backend();
//! tokio::spawn(controller.run(shutdown));
//! signals.set_session(Some(Session::new(api_key)));
//! ```

mod debug;
mod invoker;
mod notify;
mod scheduler;
mod selector;
mod signals;

pub use debug::{debug_handle_available, BuildMode, DebugHandle};
pub use invoker::{SyncInvoker, SyncOutcome, SYNC_ERROR_NOTIFICATION_ID};
pub use notify::{
    LogNotifier, Notification, NotificationBoard, NotificationSink, NotifyOptions, Severity,
};
pub use scheduler::{ControllerOptions, ControllerState, SyncController, SYNC_INTERVAL};
pub use selector::{ActiveBackend, BackendKind, BackendSelector};
pub use signals::{
    EnvironmentSignals, EnvironmentState, Session, SignalReceivers, SignalsClosed,
    StorageDependencies,
};
