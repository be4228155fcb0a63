pub mod error;

use once_cell::sync::Lazy;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    models::{
        Config, ConfigMetadata, DEFAULT_CLIENT_BUFFER, DEFAULT_DEBOUNCE_MS,
        DEFAULT_EVENT_QUEUE_CAPACITY, DEFAULT_HEARTBEAT_SECS, DEFAULT_HOST,
        DEFAULT_PORT, ProjectConfig, ServerConfig, SseSettings, WatchSettings,
        sources::{EnvConfig, FileConfig},
    },
    util::{expand_home, normalize_extensions},
    validation::{ConfigWarnings, dedupe_projects},
};
use error::ConfigLoadError;

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("tickboard.toml"),
        PathBuf::from("config/tickboard.toml"),
    ]
});

const DEFAULT_REGISTRY_DIR: &str = "~/.config/markdown-ticket/projects";

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        let env_config = EnvConfig::gather();
        let (file_config, config_path) = self.load_file_config(&env_config)?;
        tracing::debug!(
            config_path = ?config_path,
            env_file_loaded,
            "resolved configuration sources"
        );

        let (config, warnings) = compose_config(
            file_config,
            env_config,
            ConfigMetadata {
                config_path,
                env_file_loaded,
            },
        )?;

        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let source = ConfigPathSource {
            explicit: self.options.config_path.clone(),
            env: env_config.config_path.clone(),
            default: DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
                .cloned(),
        };

        let Some((path, provenance)) = source.resolved_path() else {
            return Ok((None, None));
        };

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let file_config = read_file_config(&path)?;
        Ok((Some(file_config), Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|err| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source: err,
        })?;
    toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source: err,
    })
}

/// Merge file and environment sources over the defaults.
///
/// Environment values win over the file; the file wins over defaults.
pub fn compose_config(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    metadata: ConfigMetadata,
) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    if metadata.config_path.is_none() {
        warnings.push_with_hint(
            "No tickboard.toml detected; falling back to environment variables",
            "Create tickboard.toml with [[projects]] entries to watch ticket folders",
        );
    }

    for (name, raw) in &env.invalid {
        warnings.push_with_hint(
            format!("ignoring {name}={raw:?}: not a valid value"),
            format!("Unset {name} or give it a numeric value"),
        );
    }

    let FileConfig {
        server: file_server,
        watch: file_watch,
        sse: file_sse,
        projects: file_projects,
    } = file_config.unwrap_or_default();
    let home = env.home.as_deref();

    let server = ServerConfig {
        host: env
            .server_host
            .clone()
            .or(file_server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: env.server_port.or(file_server.port).unwrap_or(DEFAULT_PORT),
    };

    let debounce_ms = env
        .debounce_ms
        .or(file_watch.debounce_ms)
        .unwrap_or(DEFAULT_DEBOUNCE_MS)
        .max(1);

    let registry_dir = env
        .registry_dir
        .clone()
        .or(file_watch.registry_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY_DIR));
    let registry_dir = expand_home(&registry_dir, home);
    let registry_dir = if registry_dir.is_dir() {
        Some(registry_dir)
    } else {
        warnings.push_with_hint(
            format!(
                "project registry directory {} does not exist; project create/delete events are disabled",
                registry_dir.display()
            ),
            "Set TICKBOARD_REGISTRY_DIR or [watch].registry_dir",
        );
        None
    };

    let ticket_extensions = normalize_extensions(
        file_watch
            .ticket_extensions
            .unwrap_or_else(|| vec!["md".to_string()]),
    );
    if ticket_extensions.is_empty() {
        return Err(ConfigLoadError::Invalid {
            field: "watch.ticket_extensions",
            message: "at least one extension is required".to_string(),
        });
    }
    let registry_extensions = normalize_extensions(
        file_watch
            .registry_extensions
            .unwrap_or_else(|| vec!["toml".to_string()]),
    );

    let watch = WatchSettings {
        debounce_window: Duration::from_millis(debounce_ms),
        registry_dir,
        ticket_extensions,
        registry_extensions,
    };

    let sse = SseSettings {
        heartbeat_interval: Duration::from_secs(
            env.heartbeat_secs
                .or(file_sse.heartbeat_secs)
                .unwrap_or(DEFAULT_HEARTBEAT_SECS)
                .max(1),
        ),
        event_queue_capacity: file_sse
            .event_queue_capacity
            .unwrap_or(DEFAULT_EVENT_QUEUE_CAPACITY)
            .max(1),
        client_buffer: file_sse
            .client_buffer
            .unwrap_or(DEFAULT_CLIENT_BUFFER)
            .max(1),
        ticket_lookup_timeout: Duration::from_millis(
            file_sse.ticket_lookup_timeout_ms.unwrap_or(debounce_ms).max(1),
        ),
    };

    let projects = file_projects
        .into_iter()
        .map(|project| ProjectConfig {
            id: project.id.trim().to_string(),
            path: expand_home(&project.path, home),
        })
        .collect::<Vec<_>>();
    let projects = dedupe_projects(projects, &mut warnings);
    if projects.is_empty() {
        warnings.push_with_hint(
            "No projects configured; only the project registry is watched",
            "Add [[projects]] entries with an id and an absolute path",
        );
    }

    let config = Config {
        server,
        watch,
        sse,
        projects,
        metadata,
    };

    Ok((config, warnings))
}

#[derive(Debug, Default)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: Option<PathBuf>,
}

impl ConfigPathSource {
    fn resolved_path(&self) -> Option<(PathBuf, ConfigPathProvenance)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), ConfigPathProvenance::Explicit));
        }
        if let Some(path) = &self.env {
            return Some((path.clone(), ConfigPathProvenance::Env));
        }
        if let Some(path) = &self.default {
            return Some((path.clone(), ConfigPathProvenance::Default));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    fn is_explicit(self) -> bool {
        matches!(
            self,
            ConfigPathProvenance::Explicit | ConfigPathProvenance::Env
        )
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}
