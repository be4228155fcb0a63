use std::fmt;
use std::path::{Path, PathBuf};

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{
    Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher,
};
use tickboard_model::{ChangeKind, WatchedPath};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{Result, WatchError};

/// Kind of a raw filesystem notification, before any debouncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    Added,
    Changed,
    Removed,
}

impl From<RawEventKind> for ChangeKind {
    fn from(kind: RawEventKind) -> Self {
        match kind {
            RawEventKind::Added => ChangeKind::Add,
            RawEventKind::Changed => ChangeKind::Change,
            RawEventKind::Removed => ChangeKind::Unlink,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFileEvent {
    pub kind: RawEventKind,
    pub path: PathBuf,
}

impl RawFileEvent {
    pub fn new(kind: RawEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Everything a [`PathWatcher`] reports back to its owning service.
pub enum WatchMessage {
    Event(RawFileEvent),
    /// The underlying OS watch failed after setup.
    Error { watch_id: String, message: String },
}

impl fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMessage::Event(event) => f
                .debug_struct("WatchMessage::Event")
                .field("kind", &event.kind)
                .field("path", &event.path)
                .finish(),
            WatchMessage::Error { watch_id, message } => f
                .debug_struct("WatchMessage::Error")
                .field("watch_id", watch_id)
                .field("message", message)
                .finish(),
        }
    }
}

/// A recursive `notify` watch over a single [`WatchedPath`].
///
/// Notifications are classified into [`RawFileEvent`]s on the notify thread
/// and pushed into the channel handed to [`PathWatcher::spawn`]. Dropping the
/// watcher stops the OS watch.
pub struct PathWatcher {
    watched: WatchedPath,
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl PathWatcher {
    /// Start watching. Blocking: recursive watches walk the whole tree, so
    /// call this from `spawn_blocking`.
    pub fn spawn(
        watched: WatchedPath,
        tx: mpsc::Sender<WatchMessage>,
    ) -> Result<Self> {
        let root = std::fs::canonicalize(&watched.path)
            .map_err(|err| WatchError::setup(&watched.id, &watched.path, err))?;
        if !root.is_dir() {
            return Err(WatchError::setup(
                &watched.id,
                &watched.path,
                "not a directory",
            ));
        }

        let watch_id = watched.id.clone();
        let log_root = root.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for raw in classify_event(&event) {
                        if let Err(err) = tx.blocking_send(WatchMessage::Event(raw)) {
                            warn!(
                                "fs_watch channel send failed for {}: {}",
                                log_root.display(),
                                err
                            );
                            return;
                        }
                    }
                }
                Err(err) => {
                    let _ = tx.blocking_send(WatchMessage::Error {
                        watch_id: watch_id.clone(),
                        message: err.to_string(),
                    });
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|err| WatchError::setup(&watched.id, &watched.path, err))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|err| WatchError::setup(&watched.id, &watched.path, err))?;

        Ok(Self {
            watched,
            root,
            _watcher: watcher,
        })
    }

    pub fn watched(&self) -> &WatchedPath {
        &self.watched
    }

    /// Canonical form of the watched directory, as reported by the OS.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl fmt::Debug for PathWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathWatcher")
            .field("id", &self.watched.id)
            .field("root", &self.root)
            .finish()
    }
}

/// Translate one notify event into zero or more raw file events.
///
/// Renames are split into a removal of the old name and an addition of the
/// new one. Access notifications are dropped.
pub fn classify_event(event: &Event) -> Vec<RawFileEvent> {
    let mut paths = event.paths.iter();
    let Some(first) = paths.next() else {
        return Vec::new();
    };

    match event.kind {
        EventKind::Create(_) => vec![RawFileEvent::new(RawEventKind::Added, first)],
        EventKind::Remove(_) => vec![RawFileEvent::new(RawEventKind::Removed, first)],
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = vec![RawFileEvent::new(RawEventKind::Removed, first)];
            if let Some(second) = paths.next() {
                out.push(RawFileEvent::new(RawEventKind::Added, second));
            }
            out
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            vec![RawFileEvent::new(RawEventKind::Removed, first)]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            vec![RawFileEvent::new(RawEventKind::Added, first)]
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            let kind = if first.exists() {
                RawEventKind::Added
            } else {
                RawEventKind::Removed
            };
            vec![RawFileEvent::new(kind, first)]
        }
        EventKind::Modify(_) => event
            .paths
            .iter()
            .map(|path| RawFileEvent::new(RawEventKind::Changed, path))
            .collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}
