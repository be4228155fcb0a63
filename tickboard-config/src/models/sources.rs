use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub watch: FileWatchConfig,
    #[serde(default)]
    pub sse: FileSseConfig,
    #[serde(default)]
    pub projects: Vec<FileProjectConfig>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileWatchConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_extensions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_extensions: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileSseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_queue_capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_buffer: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_lookup_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileProjectConfig {
    pub id: String,
    pub path: PathBuf,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub registry_dir: Option<PathBuf>,
    pub debounce_ms: Option<u64>,
    pub heartbeat_secs: Option<u64>,
    pub home: Option<PathBuf>,
    /// Variables that were set but could not be parsed, as `(name, raw)`.
    pub invalid: Vec<(String, String)>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut reader = EnvReader {
            lookup,
            invalid: Vec::new(),
        };
        let mut config = Self {
            config_path: reader.string("TICKBOARD_CONFIG").map(PathBuf::from),
            server_host: reader.string("TICKBOARD_HOST"),
            server_port: reader.parsed("TICKBOARD_PORT"),
            registry_dir: reader
                .string("TICKBOARD_REGISTRY_DIR")
                .map(PathBuf::from),
            debounce_ms: reader.parsed("TICKBOARD_DEBOUNCE_MS"),
            heartbeat_secs: reader.parsed("TICKBOARD_HEARTBEAT_SECS"),
            home: reader.string("HOME").map(PathBuf::from),
            invalid: Vec::new(),
        };
        config.invalid = reader.invalid;
        config
    }
}

struct EnvReader<F> {
    lookup: F,
    invalid: Vec<(String, String)>,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
    }

    fn parsed<T: std::str::FromStr>(&mut self, name: &str) -> Option<T> {
        let raw = self.string(name)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.invalid.push((name.to_string(), raw));
                None
            }
        }
    }
}
