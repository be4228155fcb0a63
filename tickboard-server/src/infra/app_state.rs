use std::{fmt, sync::Arc};

use tickboard_config::Config;

use crate::infra::file_watcher::FileWatcherService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub file_watcher: Arc<FileWatcherService>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(config: Arc<Config>, file_watcher: Arc<FileWatcherService>) -> Self {
        Self {
            config,
            file_watcher,
        }
    }

    /// Outbound buffer handed to each new push client.
    pub fn client_buffer(&self) -> usize {
        self.config.sse.client_buffer
    }
}
