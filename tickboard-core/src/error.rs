use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("watched path id '{0}' is already registered")]
    DuplicateId(String),

    #[error("failed to watch '{id}' at {}: {reason}", path.display())]
    SetupFailed {
        id: String,
        path: PathBuf,
        reason: String,
    },

    #[error("no watched path registered under id '{0}'")]
    UnknownId(String),

    #[error("path watcher service is not running")]
    NotRunning,
}

impl WatchError {
    pub(crate) fn setup(
        id: &str,
        path: &std::path::Path,
        reason: impl ToString,
    ) -> Self {
        WatchError::SetupFailed {
            id: id.to_string(),
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Id of the watched path this error refers to, when there is one.
    pub fn watch_id(&self) -> Option<&str> {
        match self {
            WatchError::DuplicateId(id)
            | WatchError::UnknownId(id)
            | WatchError::SetupFailed { id, .. } => Some(id),
            WatchError::NotRunning => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;
