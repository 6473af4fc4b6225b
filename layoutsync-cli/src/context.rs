//! Wires configuration into the layout storage stack and sync controller.

use std::sync::Arc;

use layoutsync_core::controller::{NotificationSink, NotifyOptions};
use layoutsync_core::{
    ControllerOptions, EnvironmentSignals, HttpRemoteLayoutStore, LayoutStorage,
    SqliteLayoutCache, StorageDependencies, SyncController,
};

use crate::config::Config;

/// Prints notifications to stderr and mirrors them to the log.
#[derive(Debug, Default)]
pub struct TerminalNotifier;

impl NotificationSink for TerminalNotifier {
    fn notify(&self, message: &str, options: NotifyOptions) {
        tracing::debug!(id = %options.id, "notification: {}", message);
        eprintln!("[{}] {}", options.severity, message);
    }
}

/// Everything a command needs to work with layouts.
pub struct LayoutContext {
    pub signals: Arc<EnvironmentSignals>,
    pub controller: SyncController,
    pub remote: Option<Arc<HttpRemoteLayoutStore>>,
}

impl LayoutContext {
    /// Opens the cache and builds the controller from `config`.
    ///
    /// The network is assumed reachable; `watch` replaces this with a probe.
    pub async fn open(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let cache = Arc::new(SqliteLayoutCache::open(&config.cache_path.value).await?);

        let remote = config.sync.server_url.as_ref().map(|url| {
            Arc::new(HttpRemoteLayoutStore::new(
                url.clone(),
                config.sync.api_key.clone().unwrap_or_default(),
            ))
        });
        // Without a server URL there is no session, so the reconciling backend
        // (and this placeholder) is never used.
        let remote_store = remote
            .clone()
            .unwrap_or_else(|| Arc::new(HttpRemoteLayoutStore::new("localhost", "")));

        let signals = Arc::new(EnvironmentSignals::new(StorageDependencies::new(
            cache,
            remote_store,
        )));
        signals.set_remote_layouts_enabled(config.sync.remote_layouts);
        signals.set_session(config.sync.session());
        signals.set_network_reachable(true);
        signals.set_document_visible(true);

        let controller = SyncController::new(
            &signals,
            Arc::new(TerminalNotifier),
            ControllerOptions {
                interval: config.sync.interval(),
                build_mode: config.build_mode.value,
            },
        );

        Ok(Self {
            signals,
            controller,
            remote,
        })
    }

    /// The storage backend currently serving layout requests.
    pub fn storage(&self) -> Arc<dyn LayoutStorage> {
        let active = self.controller.active_backend();
        let storage = active.borrow().storage();
        storage
    }
}
