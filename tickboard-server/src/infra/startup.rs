//! Wiring from a loaded [`Config`] to a ready-to-start [`AppState`].

use std::sync::Arc;

use tickboard_config::{Config, SseSettings, WatchSettings};
use tickboard_core::{
    FsWatchConfig, NoopTicketLookup, PathWatcherService, TicketLookup,
};

use crate::infra::{
    app_state::AppState,
    file_watcher::FileWatcherService,
    sse::{BroadcasterConfig, ClientManager, SseBroadcaster},
};

pub fn fs_watch_config(settings: &WatchSettings) -> FsWatchConfig {
    FsWatchConfig {
        debounce_window: settings.debounce_window,
        ticket_extensions: settings.ticket_extensions.clone(),
        registry_extensions: settings.registry_extensions.clone(),
        ..FsWatchConfig::default()
    }
}

pub fn broadcaster_config(settings: &SseSettings) -> BroadcasterConfig {
    BroadcasterConfig {
        queue_capacity: settings.event_queue_capacity,
        heartbeat_interval: settings.heartbeat_interval,
        lookup_timeout: settings.ticket_lookup_timeout,
    }
}

/// Build the pipeline without starting it.
pub fn build_app_state(config: Arc<Config>, lookup: Arc<dyn TicketLookup>) -> AppState {
    let watcher = PathWatcherService::with_logging(fs_watch_config(&config.watch));
    let broadcaster = Arc::new(SseBroadcaster::new(
        broadcaster_config(&config.sse),
        ClientManager::new(),
        lookup,
    ));
    let file_watcher = Arc::new(FileWatcherService::new(watcher, broadcaster));
    AppState::new(config, file_watcher)
}

/// [`build_app_state`] without a ticket service; every change goes out with
/// `ticketData: null`.
pub fn build_default_app_state(config: Arc<Config>) -> AppState {
    build_app_state(config, Arc::new(NoopTicketLookup))
}
