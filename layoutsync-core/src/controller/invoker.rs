//! The single code path that runs a sync, shared by the timer and manual triggers.

use serde::Serialize;
use std::sync::Arc;

use super::notify::{NotificationSink, NotifyOptions, Severity};
use super::selector::{ActiveBackend, BackendSelector};
use super::signals::SignalReceivers;
use crate::storage::LayoutConflict;

/// Notification id for sync failures. Repeated failures replace one another.
pub const SYNC_ERROR_NOTIFICATION_ID: &str = "sync-error";

/// Result of one sync attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum SyncOutcome {
    /// Reconciliation completed. Conflicts are reported, not resolved.
    Synced { conflicts: Vec<LayoutConflict> },
    /// Reconciliation failed; `message` is the cause.
    Failed { message: String },
    /// The active backend cannot reconcile (remote layouts disabled or no session).
    Unavailable,
}

impl SyncOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SyncOutcome::Failed { .. })
    }
}

struct Inner {
    selector: Arc<BackendSelector>,
    signals: SignalReceivers,
    notifier: Arc<dyn NotificationSink>,
}

/// Runs reconciliation on whichever backend is active at call time.
#[derive(Clone)]
pub struct SyncInvoker {
    inner: Arc<Inner>,
}

impl SyncInvoker {
    pub fn new(
        selector: Arc<BackendSelector>,
        signals: SignalReceivers,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                selector,
                signals,
                notifier,
            }),
        }
    }

    /// Re-evaluates backend selection against the current signal values.
    pub fn active_backend(&self) -> ActiveBackend {
        let signals = &self.inner.signals;
        self.inner.selector.select(
            &signals.dependencies(),
            signals.remote_layouts_enabled(),
            signals.session_present(),
        )
    }

    /// Runs one sync attempt. Never fails: errors become a notification and
    /// [`SyncOutcome::Failed`].
    pub async fn sync(&self) -> SyncOutcome {
        let backend = self.active_backend();
        let Some(reconciler) = backend.reconciler() else {
            tracing::debug!("Skipping sync, active backend is {}", backend.kind());
            return SyncOutcome::Unavailable;
        };

        match reconciler.reconcile().await {
            Ok(conflicts) => {
                if conflicts.is_empty() {
                    tracing::info!("Layouts synced, no conflicts");
                } else {
                    tracing::info!("Layouts synced, {} conflict(s)", conflicts.len());
                    for conflict in &conflicts {
                        tracing::info!("Conflict: {}", conflict);
                    }
                }
                SyncOutcome::Synced { conflicts }
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!("Layout sync failed: {}", message);
                self.inner.notifier.notify(
                    &format!("Sync failed: {}", message),
                    NotifyOptions {
                        id: SYNC_ERROR_NOTIFICATION_ID.to_string(),
                        severity: Severity::Error,
                    },
                );
                SyncOutcome::Failed { message }
            }
        }
    }

    /// True if both invokers share the same underlying state.
    pub fn same_invoker(&self, other: &SyncInvoker) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
