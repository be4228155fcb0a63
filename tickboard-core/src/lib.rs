//! # Tickboard Core
//!
//! Filesystem side of the tickboard change pipeline.
//!
//! A [`PathWatcher`](fs_watch::PathWatcher) wraps one `notify` watcher per
//! project root. Their raw notifications are funnelled into a single
//! [`PathWatcherService`](fs_watch::PathWatcherService) loop, which resolves
//! each event to its project, drops noise (editor swap files, foreign
//! extensions), and debounces per `eventType:filename:projectId` key before
//! publishing [`CoalescedChangeEvent`](tickboard_model::CoalescedChangeEvent)s
//! on a broadcast channel.
//!
//! The server crate turns those events into push frames; nothing in here
//! knows about HTTP.

#![allow(missing_docs)]

pub mod collaborators;
pub mod error;
pub mod fs_watch;

pub use collaborators::{NoopTicketLookup, ProjectDiscovery, TicketLookup};
pub use error::{Result, WatchError};
pub use fs_watch::{
    FsWatchConfig, FsWatchObserver, LoggingFsWatchObserver,
    NoopFsWatchObserver, PathWatcherService, StartSummary,
};
