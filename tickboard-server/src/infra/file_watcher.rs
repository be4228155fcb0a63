//! Composition root of the change pipeline.
//!
//! [`FileWatcherService`] owns the path watchers and the broadcaster, and
//! runs two background tasks while started: one forwarding coalesced changes
//! into push frames, one emitting heartbeats.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tickboard_core::{
    FsWatchObserver, LoggingFsWatchObserver, PathWatcherService, StartSummary,
    WatchError,
};
use tickboard_model::{CoalescedChangeEvent, WatchedPath};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::sse::{ClientManager, SseBroadcaster};

pub struct FileWatcherService<O: FsWatchObserver = LoggingFsWatchObserver> {
    watcher: PathWatcherService<O>,
    broadcaster: Arc<SseBroadcaster>,
    tasks: Mutex<Option<PipelineTasks>>,
}

struct PipelineTasks {
    cancel: CancellationToken,
    forward: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

impl<O: FsWatchObserver + 'static> fmt::Debug for FileWatcherService<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileWatcherService")
            .field("watcher", &self.watcher)
            .field("broadcaster", &self.broadcaster)
            .field("running", &self.tasks.lock().is_some())
            .finish()
    }
}

impl<O: FsWatchObserver + 'static> FileWatcherService<O> {
    pub fn new(watcher: PathWatcherService<O>, broadcaster: Arc<SseBroadcaster>) -> Self {
        Self {
            watcher,
            broadcaster,
            tasks: Mutex::new(None),
        }
    }

    /// Start the forwarding and heartbeat tasks, then watch `paths`.
    ///
    /// Duplicate ids reject the call and leave the service stopped.
    pub async fn start(&self, paths: Vec<WatchedPath>) -> Result<StartSummary, WatchError> {
        let started_here = {
            let mut tasks = self.tasks.lock();
            if tasks.is_none() {
                let cancel = CancellationToken::new();
                let forward = spawn_forwarder(
                    self.watcher.subscribe(),
                    Arc::clone(&self.broadcaster),
                    cancel.clone(),
                );
                let heartbeat = self.broadcaster.spawn_heartbeat(cancel.clone());
                *tasks = Some(PipelineTasks {
                    cancel,
                    forward,
                    heartbeat,
                });
                true
            } else {
                false
            }
        };

        match self.watcher.start(paths).await {
            Ok(summary) => Ok(summary),
            Err(err) => {
                if started_here {
                    self.shutdown_tasks().await;
                }
                Err(err)
            }
        }
    }

    /// Stop watching, stop background tasks and disconnect every client.
    /// Safe to call repeatedly.
    pub async fn stop(&self) {
        self.watcher.stop().await;
        let was_running = self.shutdown_tasks().await;
        let disconnected = self.broadcaster.clients().disconnect_all();
        if was_running {
            info!(disconnected, "file watcher service stopped");
        }
    }

    pub async fn add_path(&self, watched: WatchedPath) -> Result<(), WatchError> {
        self.watcher.add_path(watched).await
    }

    pub async fn remove_path(&self, id: &str) -> Result<(), WatchError> {
        self.watcher.remove_path(id).await
    }

    pub fn client_count(&self) -> usize {
        self.broadcaster.clients().client_count()
    }

    /// Coalesced changes, before they are turned into push frames.
    pub fn subscribe(&self) -> broadcast::Receiver<CoalescedChangeEvent> {
        self.watcher.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.tasks.lock().is_some()
    }

    pub async fn watched_paths(&self) -> Vec<WatchedPath> {
        self.watcher.watched_paths().await
    }

    pub fn broadcaster(&self) -> &Arc<SseBroadcaster> {
        &self.broadcaster
    }

    pub fn clients(&self) -> &ClientManager {
        self.broadcaster.clients()
    }

    async fn shutdown_tasks(&self) -> bool {
        let tasks = self.tasks.lock().take();
        let Some(tasks) = tasks else {
            return false;
        };
        tasks.cancel.cancel();
        for (name, handle) in [("forward", tasks.forward), ("heartbeat", tasks.heartbeat)] {
            if let Err(err) = handle.await
                && err.is_panic()
            {
                error!(task = name, "pipeline task panicked: {err}");
            }
        }
        true
    }
}

fn spawn_forwarder(
    mut changes: broadcast::Receiver<CoalescedChangeEvent>,
    broadcaster: Arc<SseBroadcaster>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let change = tokio::select! {
                _ = cancel.cancelled() => break,
                change = changes.recv() => change,
            };

            match change {
                Ok(change) => {
                    let Some(message) = broadcaster.format(&change).await else {
                        continue;
                    };
                    let report = broadcaster.broadcast(message);
                    debug!(
                        key = %change.key(),
                        delivered = report.delivered,
                        removed = report.removed,
                        "change broadcast"
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "change forwarder lagged; clients must resync");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
