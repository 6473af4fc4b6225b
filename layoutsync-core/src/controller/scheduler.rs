//! The sync controller's event loop.
//!
//! A single task owns all scheduling decisions. On every input change it
//! re-selects the active backend, recomputes the gate, and arms or disarms
//! the periodic timer. Ticks spawn the sync so the loop keeps handling events
//! while a reconciliation is in flight.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use super::debug::{debug_handle_available, BuildMode, DebugHandle};
use super::invoker::SyncInvoker;
use super::notify::NotificationSink;
use super::selector::{ActiveBackend, BackendKind, BackendSelector};
use super::signals::{EnvironmentSignals, SignalReceivers};

/// Time between automatic syncs while the gate is open.
pub const SYNC_INTERVAL: Duration = Duration::from_millis(15_000);

/// Controller state as observed from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    /// Cache-only backend active; nothing to reconcile.
    Disabled,
    /// Reconciling backend active, no scheduled sync in flight.
    Armed,
    /// A scheduled sync is in flight.
    Syncing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    pub interval: Duration,
    pub build_mode: BuildMode,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            interval: SYNC_INTERVAL,
            build_mode: BuildMode::current(),
        }
    }
}

/// Selects the active layout storage and schedules reconciliation.
pub struct SyncController {
    signals: SignalReceivers,
    invoker: SyncInvoker,
    debug_handle: DebugHandle,
    options: ControllerOptions,
    active_tx: watch::Sender<ActiveBackend>,
    debug_tx: watch::Sender<Option<DebugHandle>>,
    state_tx: watch::Sender<ControllerState>,
}

impl SyncController {
    pub fn new(
        signals: &EnvironmentSignals,
        notifier: Arc<dyn NotificationSink>,
        options: ControllerOptions,
    ) -> Self {
        let receivers = signals.subscribe();
        let invoker = SyncInvoker::new(
            Arc::new(BackendSelector::new()),
            receivers.clone(),
            notifier,
        );
        let debug_handle = DebugHandle::new(invoker.clone());

        let active = invoker.active_backend();
        let state = match active.kind() {
            BackendKind::CacheOnly => ControllerState::Disabled,
            BackendKind::Reconciling => ControllerState::Armed,
        };
        let debug = debug_handle_available(options.build_mode, receivers.session_present())
            .then(|| debug_handle.clone());

        Self {
            signals: receivers,
            invoker,
            debug_handle,
            options,
            active_tx: watch::Sender::new(active),
            debug_tx: watch::Sender::new(debug),
            state_tx: watch::Sender::new(state),
        }
    }

    /// The storage backend layout consumers should use.
    pub fn active_backend(&self) -> watch::Receiver<ActiveBackend> {
        self.active_tx.subscribe()
    }

    /// The debug handle, when available.
    pub fn debug_handle(&self) -> watch::Receiver<Option<DebugHandle>> {
        self.debug_tx.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<ControllerState> {
        self.state_tx.subscribe()
    }

    /// The invoker shared by the timer and the debug handle.
    pub fn invoker(&self) -> SyncInvoker {
        self.invoker.clone()
    }

    /// Runs until `shutdown` resolves or every signal sender is dropped.
    ///
    /// Syncs already in flight are not cancelled; they finish in the
    /// background and still report failures.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
        let mut timer: Option<Interval> = None;
        let mut in_flight = 0usize;

        loop {
            let gate_open = self.signals.environment().gate();
            let backend = self.publish_backend();
            self.publish_debug_handle();
            self.publish_state(backend, in_flight);

            let should_run = gate_open && backend == BackendKind::Reconciling;
            match (should_run, timer.is_some()) {
                (true, false) => {
                    tracing::debug!("Sync timer armed, every {:?}", self.options.interval);
                    let period = self.options.interval;
                    let mut interval = interval_at(Instant::now() + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    timer = Some(interval);
                }
                (false, true) => {
                    tracing::debug!("Sync timer disarmed");
                    timer = None;
                }
                _ => {}
            }

            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::debug!("Sync controller shutting down");
                    break;
                }
                changed = self.signals.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Environment signals closed, stopping sync controller");
                        break;
                    }
                }
                _ = next_tick(&mut timer) => {
                    // A tick can race a signal that closed the gate.
                    if !self.signals.environment().gate()
                        || self.invoker.active_backend().kind() != BackendKind::Reconciling
                    {
                        tracing::debug!("Skipping sync tick, gate closed");
                        continue;
                    }
                    in_flight += 1;
                    let invoker = self.invoker.clone();
                    let done = done_tx.clone();
                    tokio::spawn(async move {
                        invoker.sync().await;
                        let _ = done.send(());
                    });
                }
                Some(()) = done_rx.recv() => {
                    in_flight = in_flight.saturating_sub(1);
                }
            }
        }
    }

    fn publish_backend(&self) -> BackendKind {
        let backend = self.invoker.active_backend();
        let kind = backend.kind();
        self.active_tx.send_if_modified(|current| {
            if current.same_instance(&backend) {
                false
            } else {
                tracing::info!("Active layout storage: {}", kind);
                *current = backend;
                true
            }
        });
        kind
    }

    fn publish_debug_handle(&self) {
        let available =
            debug_handle_available(self.options.build_mode, self.signals.session_present());
        self.debug_tx.send_if_modified(|current| {
            if current.is_some() == available {
                false
            } else {
                *current = available.then(|| self.debug_handle.clone());
                true
            }
        });
    }

    fn publish_state(&self, backend: BackendKind, in_flight: usize) {
        let state = if in_flight > 0 {
            ControllerState::Syncing
        } else if backend == BackendKind::Reconciling {
            ControllerState::Armed
        } else {
            ControllerState::Disabled
        };
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryLayoutCache;
    use crate::controller::invoker::{SyncOutcome, SYNC_ERROR_NOTIFICATION_ID};
    use crate::controller::notify::{NotificationBoard, NotifyOptions};
    use crate::controller::signals::{Session, StorageDependencies};
    use crate::layout::{Layout, LayoutId};
    use crate::remote::{MemoryRemoteLayoutStore, RemoteError, RemoteLayout, RemoteLayoutStore};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;
    use tokio::time::sleep;

    /// Records every notify call, unlike the board which de-duplicates.
    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(String, NotifyOptions)>>,
        board: NotificationBoard,
    }

    impl RecordingSink {
        fn calls(&self) -> Vec<(String, NotifyOptions)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl NotificationSink for RecordingSink {
        fn notify(&self, message: &str, options: NotifyOptions) {
            self.calls
                .lock()
                .unwrap()
                .push((message.to_string(), options.clone()));
            self.board.notify(message, options);
        }
    }

    struct Fixture {
        signals: EnvironmentSignals,
        remote: Arc<MemoryRemoteLayoutStore>,
        sink: Arc<RecordingSink>,
        controller: Option<SyncController>,
    }

    impl Fixture {
        fn new(build_mode: BuildMode) -> Self {
            let remote = Arc::new(MemoryRemoteLayoutStore::new());
            let signals = EnvironmentSignals::new(StorageDependencies::new(
                Arc::new(MemoryLayoutCache::new()),
                remote.clone(),
            ));
            signals.set_remote_layouts_enabled(true);
            signals.set_session(Some(Session::new("token")));
            signals.set_network_reachable(true);
            signals.set_document_visible(true);

            let sink = Arc::new(RecordingSink::default());
            let controller = SyncController::new(
                &signals,
                sink.clone(),
                ControllerOptions {
                    interval: SYNC_INTERVAL,
                    build_mode,
                },
            );
            Self {
                signals,
                remote,
                sink,
                controller: Some(controller),
            }
        }

        /// Starts the loop; dropping the returned sender stops it.
        fn start(&mut self) -> (oneshot::Sender<()>, JoinHandle<()>) {
            let controller = self.controller.take().expect("controller already started");
            let (tx, rx) = oneshot::channel::<()>();
            let handle = tokio::spawn(controller.run(async move {
                let _ = rx.await;
            }));
            (tx, handle)
        }

        /// Reconcile passes observed; each pass over empty stores lists once.
        fn reconcile_count(&self) -> usize {
            self.remote.request_count()
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[tokio::test(start_paused = true)]
    async fn test_syncs_at_fixed_cadence() {
        let mut f = Fixture::new(BuildMode::Development);
        let (_stop, _handle) = f.start();

        sleep(ms(14_999)).await;
        assert_eq!(f.reconcile_count(), 0);

        sleep(ms(2)).await;
        assert_eq!(f.reconcile_count(), 1);

        sleep(ms(15_000)).await;
        assert_eq!(f.reconcile_count(), 2);

        sleep(ms(45_000)).await;
        assert_eq!(f.reconcile_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_while_offline() {
        let mut f = Fixture::new(BuildMode::Development);
        f.signals.set_network_reachable(false);
        let mut state = f.controller.as_ref().unwrap().state();
        let active = f.controller.as_ref().unwrap().active_backend();
        let (_stop, _handle) = f.start();

        sleep(ms(120_000)).await;
        assert_eq!(f.reconcile_count(), 0);
        assert_eq!(active.borrow().kind(), BackendKind::Reconciling);
        assert_eq!(*state.borrow_and_update(), ControllerState::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_starts_fresh_interval() {
        let mut f = Fixture::new(BuildMode::Development);
        f.signals.set_network_reachable(false);
        let (_stop, _handle) = f.start();

        sleep(ms(40_000)).await;
        f.signals.set_network_reachable(true);

        // No catch-up tick right after the transition
        sleep(ms(14_900)).await;
        assert_eq!(f.reconcile_count(), 0);

        sleep(ms(200)).await;
        assert_eq!(f.reconcile_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_flip_stops_ticks() {
        let mut f = Fixture::new(BuildMode::Development);
        let (_stop, _handle) = f.start();

        sleep(ms(15_001)).await;
        assert_eq!(f.reconcile_count(), 1);

        f.signals.set_document_visible(false);
        sleep(ms(60_000)).await;
        assert_eq!(f.reconcile_count(), 1);

        // Interval restarts from the moment the gate reopens
        f.signals.set_document_visible(true);
        sleep(ms(10_000)).await;
        assert_eq!(f.reconcile_count(), 1);
        sleep(ms(5_001)).await;
        assert_eq!(f.reconcile_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_closing_on_tick_skips_sync() {
        let mut f = Fixture::new(BuildMode::Development);
        let (_stop, _handle) = f.start();

        // Wakes at the same instant as the first tick
        sleep(SYNC_INTERVAL).await;
        f.signals.set_network_reachable(false);

        sleep(ms(1)).await;
        assert_eq!(f.reconcile_count(), 0);
        sleep(ms(60_000)).await;
        assert_eq!(f.reconcile_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_flag_never_syncs() {
        let mut f = Fixture::new(BuildMode::Development);
        f.signals.set_remote_layouts_enabled(false);
        let active = f.controller.as_ref().unwrap().active_backend();
        let state = f.controller.as_ref().unwrap().state();
        let (_stop, _handle) = f.start();

        sleep(ms(60_000)).await;
        assert_eq!(f.reconcile_count(), 0);
        assert_eq!(active.borrow().kind(), BackendKind::CacheOnly);
        assert_eq!(*state.borrow(), ControllerState::Disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_follows_flag_and_session() {
        let mut f = Fixture::new(BuildMode::Development);
        let mut active = f.controller.as_ref().unwrap().active_backend();
        let (_stop, _handle) = f.start();
        assert_eq!(active.borrow_and_update().kind(), BackendKind::Reconciling);

        f.signals.set_session(None);
        active.changed().await.unwrap();
        assert_eq!(active.borrow_and_update().kind(), BackendKind::CacheOnly);

        f.signals.set_session(Some(Session::new("again")));
        active.changed().await.unwrap();
        assert_eq!(active.borrow_and_update().kind(), BackendKind::Reconciling);

        f.signals.set_remote_layouts_enabled(false);
        active.changed().await.unwrap();
        assert_eq!(active.borrow_and_update().kind(), BackendKind::CacheOnly);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_instance_stable_across_unrelated_changes() {
        let mut f = Fixture::new(BuildMode::Development);
        let mut active = f.controller.as_ref().unwrap().active_backend();
        let first = active.borrow_and_update().clone();
        let (_stop, _handle) = f.start();

        f.signals.set_network_reachable(false);
        f.signals.set_document_visible(false);
        sleep(ms(100)).await;

        assert!(!active.has_changed().unwrap());
        assert!(active.borrow().same_instance(&first));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_failures_notify_once_each() {
        let mut f = Fixture::new(BuildMode::Development);
        f.remote
            .set_failure(Some(RemoteError::Transport("connection refused".into())));
        let (_stop, _handle) = f.start();

        sleep(ms(15_001)).await;
        let calls = f.sink.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.contains("network error"));
        assert_eq!(calls[0].1.id, SYNC_ERROR_NOTIFICATION_ID);

        sleep(ms(15_000)).await;
        assert_eq!(f.sink.calls().len(), 2);
        assert_eq!(f.sink.board.current().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debug_handle_present_in_development_with_session() {
        let mut f = Fixture::new(BuildMode::Development);
        let mut debug = f.controller.as_ref().unwrap().debug_handle();
        let handle = debug.borrow_and_update().clone().expect("debug handle");
        let (_stop, _join) = f.start();

        assert_eq!(
            handle.sync_now().await,
            SyncOutcome::Synced { conflicts: vec![] }
        );

        f.signals.set_session(None);
        debug.changed().await.unwrap();
        assert!(debug.borrow_and_update().is_none());

        f.signals.set_session(Some(Session::new("back")));
        debug.changed().await.unwrap();
        let again = debug.borrow_and_update().clone().expect("debug handle");
        assert!(again.same_handle(&handle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debug_handle_absent_in_production() {
        let f = Fixture::new(BuildMode::Production);
        let debug = f.controller.as_ref().unwrap().debug_handle();
        assert!(debug.borrow().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_sync_failure_notifies() {
        let f = Fixture::new(BuildMode::Development);
        let debug = f.controller.as_ref().unwrap().debug_handle();
        let handle = debug.borrow().clone().unwrap();
        f.remote.set_failure(Some(RemoteError::Unauthorized));

        let outcome = handle.sync_now().await;
        assert!(outcome.is_failure());
        assert_eq!(f.sink.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_signals_dropped() {
        let mut f = Fixture::new(BuildMode::Development);
        let (_stop, handle) = f.start();
        drop(f.signals);
        handle.await.unwrap();
    }

    /// Remote store whose listing takes a while and then fails.
    struct SlowFailingRemote {
        delay: Duration,
    }

    #[async_trait]
    impl RemoteLayoutStore for SlowFailingRemote {
        async fn list(&self) -> Result<Vec<RemoteLayout>, RemoteError> {
            sleep(self.delay).await;
            Err(RemoteError::Transport("connection reset".into()))
        }

        async fn get(&self, _id: LayoutId) -> Result<Option<RemoteLayout>, RemoteError> {
            unreachable!()
        }

        async fn create(&self, _layout: &Layout) -> Result<RemoteLayout, RemoteError> {
            unreachable!()
        }

        async fn update(
            &self,
            _layout: &Layout,
            _if_unmodified_since: Option<DateTime<Utc>>,
        ) -> Result<RemoteLayout, RemoteError> {
            unreachable!()
        }

        async fn delete(
            &self,
            _id: LayoutId,
            _if_unmodified_since: Option<DateTime<Utc>>,
        ) -> Result<bool, RemoteError> {
            unreachable!()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_sync_survives_shutdown() {
        let signals = EnvironmentSignals::new(StorageDependencies::new(
            Arc::new(MemoryLayoutCache::new()),
            Arc::new(SlowFailingRemote { delay: ms(10_000) }),
        ));
        signals.set_remote_layouts_enabled(true);
        signals.set_session(Some(Session::new("token")));
        signals.set_network_reachable(true);

        let sink = Arc::new(RecordingSink::default());
        let controller =
            SyncController::new(&signals, sink.clone(), ControllerOptions::default());
        let mut state = controller.state();
        let (stop, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(controller.run(async move {
            let _ = rx.await;
        }));

        sleep(ms(16_000)).await;
        assert_eq!(*state.borrow_and_update(), ControllerState::Syncing);

        stop.send(()).unwrap();
        handle.await.unwrap();
        assert!(sink.calls().is_empty());

        sleep(ms(10_000)).await;
        assert_eq!(sink.calls().len(), 1);
    }
}
