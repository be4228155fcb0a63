pub mod sources;

use std::path::PathBuf;
use std::time::Duration;

/// Fully resolved configuration handed to the server.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub watch: WatchSettings,
    pub sse: SseSettings,
    /// Project roots to watch, unique by id.
    pub projects: Vec<ProjectConfig>,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Debounce and filtering knobs for the file watchers.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub debounce_window: Duration,
    /// Global project registry directory, watched under the reserved
    /// `registry` id when present.
    pub registry_dir: Option<PathBuf>,
    pub ticket_extensions: Vec<String>,
    pub registry_extensions: Vec<String>,
}

/// Push channel knobs.
#[derive(Debug, Clone)]
pub struct SseSettings {
    pub heartbeat_interval: Duration,
    pub event_queue_capacity: usize,
    /// Outbound messages buffered per client before it counts as dead.
    pub client_buffer: usize,
    pub ticket_lookup_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub id: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 50;
pub const DEFAULT_CLIENT_BUFFER: usize = 64;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            registry_dir: None,
            ticket_extensions: vec!["md".to_string()],
            registry_extensions: vec!["toml".to_string()],
        }
    }
}

impl Default for SseSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            client_buffer: DEFAULT_CLIENT_BUFFER,
            ticket_lookup_timeout: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }
}
