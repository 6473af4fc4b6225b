//! Environmental signals observed by the sync controller.
//!
//! Each input is a `tokio::sync::watch` channel: observers publish the current
//! value through [`EnvironmentSignals`], and consumers read the latest value
//! through [`SignalReceivers`]. No history is buffered.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use crate::cache::LayoutCache;
use crate::remote::RemoteLayoutStore;

/// An authenticated user session. Opaque to the controller, which only cares
/// whether one exists.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

/// The collaborators the storage adapters are built from.
///
/// Adapters are rebuilt only when one of these changes identity.
#[derive(Clone)]
pub struct StorageDependencies {
    pub cache: Arc<dyn LayoutCache>,
    pub remote: Arc<dyn RemoteLayoutStore>,
}

impl StorageDependencies {
    pub fn new(cache: Arc<dyn LayoutCache>, remote: Arc<dyn RemoteLayoutStore>) -> Self {
        Self { cache, remote }
    }
}

/// Snapshot of the inputs to the scheduling gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvironmentState {
    pub network_reachable: bool,
    pub document_visible: bool,
    pub session_present: bool,
}

impl EnvironmentState {
    /// Whether an automatic sync may run now.
    pub fn gate(&self) -> bool {
        self.session_present && self.network_reachable && self.document_visible
    }
}

/// Returned when every signal sender has been dropped.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("environment signals closed")]
pub struct SignalsClosed;

/// Publishing side of the controller's inputs.
///
/// Initial values: remote layouts disabled, no session, network unreachable,
/// document visible.
pub struct EnvironmentSignals {
    remote_layouts_enabled: watch::Sender<bool>,
    session: watch::Sender<Option<Session>>,
    network_reachable: watch::Sender<bool>,
    document_visible: watch::Sender<bool>,
    dependencies: watch::Sender<StorageDependencies>,
}

fn set_if_changed<T: PartialEq>(sender: &watch::Sender<T>, value: T) {
    sender.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    });
}

impl EnvironmentSignals {
    pub fn new(dependencies: StorageDependencies) -> Self {
        Self {
            remote_layouts_enabled: watch::Sender::new(false),
            session: watch::Sender::new(None),
            network_reachable: watch::Sender::new(false),
            document_visible: watch::Sender::new(true),
            dependencies: watch::Sender::new(dependencies),
        }
    }

    pub fn set_remote_layouts_enabled(&self, enabled: bool) {
        set_if_changed(&self.remote_layouts_enabled, enabled);
    }

    pub fn set_session(&self, session: Option<Session>) {
        set_if_changed(&self.session, session);
    }

    pub fn set_network_reachable(&self, reachable: bool) {
        set_if_changed(&self.network_reachable, reachable);
    }

    pub fn set_document_visible(&self, visible: bool) {
        set_if_changed(&self.document_visible, visible);
    }

    /// Replaces the cache and/or remote store. Always notifies.
    pub fn set_dependencies(&self, dependencies: StorageDependencies) {
        self.dependencies.send_replace(dependencies);
    }

    pub fn subscribe(&self) -> SignalReceivers {
        SignalReceivers {
            remote_layouts_enabled: self.remote_layouts_enabled.subscribe(),
            session: self.session.subscribe(),
            network_reachable: self.network_reachable.subscribe(),
            document_visible: self.document_visible.subscribe(),
            dependencies: self.dependencies.subscribe(),
        }
    }
}

/// Current-value view of the controller's inputs.
#[derive(Clone)]
pub struct SignalReceivers {
    remote_layouts_enabled: watch::Receiver<bool>,
    session: watch::Receiver<Option<Session>>,
    network_reachable: watch::Receiver<bool>,
    document_visible: watch::Receiver<bool>,
    dependencies: watch::Receiver<StorageDependencies>,
}

impl SignalReceivers {
    pub fn remote_layouts_enabled(&self) -> bool {
        *self.remote_layouts_enabled.borrow()
    }

    pub fn session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    pub fn session_present(&self) -> bool {
        self.session.borrow().is_some()
    }

    pub fn environment(&self) -> EnvironmentState {
        EnvironmentState {
            network_reachable: *self.network_reachable.borrow(),
            document_visible: *self.document_visible.borrow(),
            session_present: self.session_present(),
        }
    }

    pub fn dependencies(&self) -> StorageDependencies {
        self.dependencies.borrow().clone()
    }

    /// Waits until any input changes.
    pub async fn changed(&mut self) -> Result<(), SignalsClosed> {
        let result = tokio::select! {
            r = self.remote_layouts_enabled.changed() => r,
            r = self.session.changed() => r,
            r = self.network_reachable.changed() => r,
            r = self.document_visible.changed() => r,
            r = self.dependencies.changed() => r,
        };
        result.map_err(|_| SignalsClosed)
    }
}
