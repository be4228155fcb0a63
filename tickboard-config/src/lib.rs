//! Shared configuration library for tickboard.
//!
//! Configuration is layered: a `.env` file, then a TOML file, then
//! `TICKBOARD_*` environment variables, then built-in defaults. Problems that
//! should not stop the server (missing project folders, duplicate project ids)
//! are reported as [`ConfigWarnings`] instead of errors.

pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{
    ConfigLoad, ConfigLoader, ConfigLoaderOptions, error::ConfigLoadError,
};
pub use models::sources::{EnvConfig, FileConfig};
pub use models::{
    Config, ConfigMetadata, ProjectConfig, ServerConfig, SseSettings,
    WatchSettings,
};
pub use validation::{ConfigWarning, ConfigWarnings};
