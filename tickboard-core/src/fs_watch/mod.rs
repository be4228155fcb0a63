//! Filesystem watch pipeline for ticket boards.
//!
//! Every registered [`WatchedPath`] gets its own [`PathWatcher`]. All of
//! them feed one channel drained by a single loop task, which resolves each
//! raw event to the watched root it belongs to, filters it, and hands it to
//! the [`Debouncer`]. Events whose debounce window closes are published on a
//! broadcast channel (see [`PathWatcherService::subscribe`]).
//!
//! Setup failures are reported to the caller and the observer; runtime
//! failures of an OS watch tear down that one watcher and raise
//! [`FsWatchObserver::on_path_failed`]. Nothing is restarted automatically.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tickboard_model::{CoalescedChangeEvent, WatchedPath};
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio::task::{JoinHandle, spawn_blocking};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod debounce;
pub mod filter;
pub mod path_watcher;

pub use debounce::Debouncer;
pub use filter::EventFilter;
pub use path_watcher::{
    PathWatcher, RawEventKind, RawFileEvent, WatchMessage, classify_event,
};

use crate::error::{Result, WatchError};

/// Configuration knobs for watch processing.
#[derive(Clone, Debug)]
pub struct FsWatchConfig {
    /// Quiet period a key must observe before its event is emitted.
    pub debounce_window: Duration,
    pub ticket_extensions: Vec<String>,
    pub registry_extensions: Vec<String>,
    /// Capacity of the raw notification channel shared by all watchers.
    pub raw_channel_capacity: usize,
    /// Capacity of the broadcast channel returned by `subscribe`.
    pub event_channel_capacity: usize,
}

impl Default for FsWatchConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(100),
            ticket_extensions: vec!["md".to_string()],
            registry_extensions: vec!["toml".to_string()],
            raw_channel_capacity: 1024,
            event_channel_capacity: 256,
        }
    }
}

/// Observer hook for surfacing watcher errors.
pub trait FsWatchObserver: Send + Sync {
    /// A path could not be watched. It was not registered.
    fn on_error(&self, watch_id: &str, error: &str);

    /// A running watcher failed and was removed from the registry.
    fn on_path_failed(&self, watch_id: &str, reason: &str);
}

/// No-op observer used in tests and when the service logs are enough.
pub struct NoopFsWatchObserver;

impl FsWatchObserver for NoopFsWatchObserver {
    fn on_error(&self, _watch_id: &str, _error: &str) {}

    fn on_path_failed(&self, _watch_id: &str, _reason: &str) {}
}

impl fmt::Debug for NoopFsWatchObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NoopFsWatchObserver")
    }
}

/// Default observer: forwards both signals to `tracing`.
pub struct LoggingFsWatchObserver;

impl FsWatchObserver for LoggingFsWatchObserver {
    fn on_error(&self, watch_id: &str, error: &str) {
        warn!(watch_id, error, "watch setup failed; path excluded");
    }

    fn on_path_failed(&self, watch_id: &str, reason: &str) {
        error!(watch_id, reason, "path watcher failed and was removed");
    }
}

impl fmt::Debug for LoggingFsWatchObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LoggingFsWatchObserver")
    }
}

/// Outcome of [`PathWatcherService::start`].
#[derive(Debug, Default)]
pub struct StartSummary {
    /// Ids now being watched.
    pub watching: Vec<String>,
    /// Paths that could not be watched. They are not in the registry.
    pub failed: Vec<WatchError>,
}

type Registry = Arc<RwLock<HashMap<String, PathWatcher>>>;

/// Owns the registry of path watchers and the debounce loop.
pub struct PathWatcherService<O: FsWatchObserver = LoggingFsWatchObserver> {
    config: FsWatchConfig,
    observer: Arc<O>,
    registry: Registry,
    events: broadcast::Sender<CoalescedChangeEvent>,
    runtime: Mutex<Option<WatchLoop>>,
}

struct WatchLoop {
    raw_tx: mpsc::Sender<WatchMessage>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl<O: FsWatchObserver + 'static> fmt::Debug for PathWatcherService<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("PathWatcherService");
        debug
            .field("config", &self.config)
            .field("observer_type", &std::any::type_name::<O>())
            .field("running", &self.runtime.lock().is_some());

        match self.registry.try_read() {
            Ok(guard) => {
                debug.field("watcher_count", &guard.len());
            }
            Err(_) => {
                debug.field("registry", &"<locked>");
            }
        }

        debug.finish()
    }
}

impl PathWatcherService<LoggingFsWatchObserver> {
    pub fn with_logging(config: FsWatchConfig) -> Self {
        Self::new(config, Arc::new(LoggingFsWatchObserver))
    }
}

impl<O: FsWatchObserver + 'static> PathWatcherService<O> {
    pub fn new(config: FsWatchConfig, observer: Arc<O>) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            config,
            observer,
            registry: Arc::new(RwLock::new(HashMap::new())),
            events,
            runtime: Mutex::new(None),
        }
    }

    /// Watch every entry of `paths`.
    ///
    /// Duplicate ids (within `paths` or against the live registry) reject
    /// the whole call before any watcher is created. Individual setup
    /// failures do not: the failing path is left out and reported in the
    /// returned summary.
    pub async fn start(&self, paths: Vec<WatchedPath>) -> Result<StartSummary> {
        {
            let guard = self.registry.read().await;
            let mut seen = HashSet::new();
            for watched in &paths {
                if guard.contains_key(&watched.id) || !seen.insert(watched.id.as_str()) {
                    return Err(WatchError::DuplicateId(watched.id.clone()));
                }
            }
        }

        let raw_tx = self.ensure_loop();
        let mut summary = StartSummary::default();
        for watched in paths {
            let id = watched.id.clone();
            match self.attach(watched, raw_tx.clone()).await {
                Ok(()) => summary.watching.push(id),
                Err(err) => {
                    self.observer.on_error(&id, &err.to_string());
                    summary.failed.push(err);
                }
            }
        }

        info!(
            watching = summary.watching.len(),
            failed = summary.failed.len(),
            "path watcher service started"
        );
        Ok(summary)
    }

    /// Watch one more path while running.
    pub async fn add_path(&self, watched: WatchedPath) -> Result<()> {
        let raw_tx = self.raw_sender().ok_or(WatchError::NotRunning)?;
        if self.registry.read().await.contains_key(&watched.id) {
            return Err(WatchError::DuplicateId(watched.id));
        }

        let id = watched.id.clone();
        self.attach(watched, raw_tx).await.inspect_err(|err| {
            if matches!(err, WatchError::SetupFailed { .. }) {
                self.observer.on_error(&id, &err.to_string());
            }
        })
    }

    /// Stop watching `id`. Unknown ids are reported but leave the registry
    /// untouched.
    pub async fn remove_path(&self, id: &str) -> Result<()> {
        match self.registry.write().await.remove(id) {
            Some(watcher) => {
                info!(
                    watch_id = id,
                    path = %watcher.watched().path.display(),
                    "stopped watching path"
                );
                Ok(())
            }
            None => {
                debug!(watch_id = id, "remove_path for unknown id");
                Err(WatchError::UnknownId(id.to_string()))
            }
        }
    }

    /// Tear down all watchers and the debounce loop. Pending debounced
    /// events are discarded. Safe to call repeatedly.
    pub async fn stop(&self) {
        let watch_loop = self.runtime.lock().take();
        let Some(watch_loop) = watch_loop else {
            return;
        };

        let watchers: Vec<_> = {
            let mut guard = self.registry.write().await;
            guard.drain().map(|(_, watcher)| watcher).collect()
        };
        let count = watchers.len();
        drop(watchers);

        watch_loop.cancel.cancel();
        drop(watch_loop.raw_tx);
        if let Err(err) = watch_loop.task.await
            && err.is_panic()
        {
            error!("watch loop panicked: {err}");
        }

        info!(watchers = count, "path watcher service stopped");
    }

    /// Receive every coalesced change emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CoalescedChangeEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.runtime.lock().is_some()
    }

    pub async fn watcher_count(&self) -> usize {
        self.registry.read().await.len()
    }

    pub async fn watched_paths(&self) -> Vec<WatchedPath> {
        let mut paths: Vec<_> = self
            .registry
            .read()
            .await
            .values()
            .map(|watcher| watcher.watched().clone())
            .collect();
        paths.sort_by(|a, b| a.id.cmp(&b.id));
        paths
    }

    pub fn config(&self) -> &FsWatchConfig {
        &self.config
    }

    fn raw_sender(&self) -> Option<mpsc::Sender<WatchMessage>> {
        self.runtime
            .lock()
            .as_ref()
            .map(|watch_loop| watch_loop.raw_tx.clone())
    }

    fn ensure_loop(&self) -> mpsc::Sender<WatchMessage> {
        let mut runtime = self.runtime.lock();
        if let Some(watch_loop) = runtime.as_ref() {
            return watch_loop.raw_tx.clone();
        }

        let (raw_tx, raw_rx) = mpsc::channel(self.config.raw_channel_capacity.max(1));
        let cancel = CancellationToken::new();
        let task = spawn_watch_loop(
            Arc::clone(&self.registry),
            Arc::clone(&self.observer),
            self.events.clone(),
            EventFilter::new(
                self.config.ticket_extensions.clone(),
                self.config.registry_extensions.clone(),
            ),
            Debouncer::new(self.config.debounce_window),
            raw_rx,
            cancel.clone(),
        );
        *runtime = Some(WatchLoop {
            raw_tx: raw_tx.clone(),
            cancel,
            task,
        });
        raw_tx
    }

    async fn attach(
        &self,
        watched: WatchedPath,
        raw_tx: mpsc::Sender<WatchMessage>,
    ) -> Result<()> {
        let id = watched.id.clone();
        let path = watched.path.clone();

        let watcher = spawn_blocking(move || PathWatcher::spawn(watched, raw_tx))
            .await
            .map_err(|join_err| {
                WatchError::setup(
                    &id,
                    &path,
                    format!("watcher initialization panicked: {join_err}"),
                )
            })??;

        let mut guard = self.registry.write().await;
        if guard.contains_key(&id) {
            return Err(WatchError::DuplicateId(id));
        }
        info!(watch_id = %id, path = %path.display(), "watching path");
        guard.insert(id, watcher);
        Ok(())
    }

    /// Feed a raw event into the loop as if a watcher had produced it.
    #[cfg(test)]
    pub(crate) async fn inject(&self, event: RawFileEvent) -> Result<()> {
        let raw_tx = self.raw_sender().ok_or(WatchError::NotRunning)?;
        raw_tx
            .send(WatchMessage::Event(event))
            .await
            .map_err(|_| WatchError::NotRunning)
    }

    #[cfg(test)]
    pub(crate) async fn inject_error(&self, watch_id: &str, message: &str) -> Result<()> {
        let raw_tx = self.raw_sender().ok_or(WatchError::NotRunning)?;
        raw_tx
            .send(WatchMessage::Error {
                watch_id: watch_id.to_string(),
                message: message.to_string(),
            })
            .await
            .map_err(|_| WatchError::NotRunning)
    }
}

fn spawn_watch_loop<O: FsWatchObserver + 'static>(
    registry: Registry,
    observer: Arc<O>,
    events: broadcast::Sender<CoalescedChangeEvent>,
    filter: EventFilter,
    mut debouncer: Debouncer,
    mut rx: mpsc::Receiver<WatchMessage>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(event) = debouncer.next_expired(), if !debouncer.is_empty() => {
                    debug!(key = %event.key(), "emitting coalesced change");
                    // No subscribers is not an error.
                    let _ = events.send(event);
                }
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    match msg {
                        WatchMessage::Event(raw) => {
                            match resolve_event(&registry, &filter, raw).await {
                                Resolved::Change(event) => debouncer.push(event),
                                Resolved::RootRemoved(id) => {
                                    fail_path(&registry, observer.as_ref(), &id, "watched directory was removed").await;
                                }
                                Resolved::Ignored => {}
                            }
                        }
                        WatchMessage::Error { watch_id, message } => {
                            fail_path(&registry, observer.as_ref(), &watch_id, &message).await;
                        }
                    }
                }
            }
        }

        debouncer.clear();
    })
}

enum Resolved {
    Change(CoalescedChangeEvent),
    RootRemoved(String),
    Ignored,
}

/// Attribute `raw` to the watched root with the longest matching prefix and
/// turn it into a change event.
async fn resolve_event(
    registry: &Registry,
    filter: &EventFilter,
    raw: RawFileEvent,
) -> Resolved {
    let guard = registry.read().await;
    let owner = guard
        .values()
        .filter(|watcher| raw.path.starts_with(watcher.root()))
        .max_by_key(|watcher| watcher.root().components().count());

    let Some(owner) = owner else {
        return Resolved::Ignored;
    };

    if raw.path == owner.root() {
        if raw.kind == RawEventKind::Removed {
            return Resolved::RootRemoved(owner.watched().id.clone());
        }
        return Resolved::Ignored;
    }

    if !filter.accepts(owner.watched(), owner.root(), &raw.path) {
        return Resolved::Ignored;
    }

    let Some(filename) = raw
        .path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
    else {
        return Resolved::Ignored;
    };

    Resolved::Change(CoalescedChangeEvent {
        event_type: raw.kind.into(),
        filename,
        project_id: owner.watched().id.clone(),
        timestamp: chrono::Utc::now().timestamp_millis(),
        path: raw.path,
    })
}

async fn fail_path<O: FsWatchObserver>(
    registry: &Registry,
    observer: &O,
    watch_id: &str,
    reason: &str,
) {
    let removed = registry.write().await.remove(watch_id);
    if let Some(watcher) = removed {
        error!(
            watch_id,
            path = %watcher.watched().path.display(),
            reason,
            "path watcher failed"
        );
        drop(watcher);
        observer.on_path_failed(watch_id, reason);
    }
}
