use std::fmt;
use std::path::{Path, PathBuf};

/// Reserved project id carried by events that originate in the global
/// project registry directory rather than in a project's ticket folder.
pub const REGISTRY_PROJECT_ID: &str = "registry";

/// A directory root plus the identifier it is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WatchedPath {
    pub id: String,
    pub path: PathBuf,
}

impl WatchedPath {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    /// The global registry directory, tagged with [`REGISTRY_PROJECT_ID`].
    pub fn registry(path: impl Into<PathBuf>) -> Self {
        Self::new(REGISTRY_PROJECT_ID, path)
    }

    pub fn is_registry(&self) -> bool {
        self.id == REGISTRY_PROJECT_ID
    }

    pub fn root(&self) -> &Path {
        &self.path
    }
}

/// Kind of change observed for a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ChangeKind {
    Add,
    Change,
    Unlink,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Add => "add",
            ChangeKind::Change => "change",
            ChangeKind::Unlink => "unlink",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a pending change inside the debounce window.
///
/// Renders as `eventType:filename:projectId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebounceKey {
    pub kind: ChangeKind,
    pub filename: String,
    pub project_id: String,
}

impl fmt::Display for DebounceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.filename, self.project_id)
    }
}

/// A debounced change, emitted once its window has closed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct CoalescedChangeEvent {
    pub event_type: ChangeKind,
    /// Basename of the changed file.
    pub filename: String,
    pub project_id: String,
    /// Milliseconds since the Unix epoch of the latest raw event folded
    /// into this change.
    pub timestamp: i64,
    /// Absolute path of the changed file. Not part of the identity.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub path: PathBuf,
}

impl CoalescedChangeEvent {
    pub fn key(&self) -> DebounceKey {
        DebounceKey {
            kind: self.event_type,
            filename: self.filename.clone(),
            project_id: self.project_id.clone(),
        }
    }

    pub fn is_registry(&self) -> bool {
        self.project_id == REGISTRY_PROJECT_ID
    }

    /// File name without its extension. For registry events this is the
    /// project's registry name.
    pub fn file_stem(&self) -> &str {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: ChangeKind, filename: &str, project: &str) -> CoalescedChangeEvent {
        CoalescedChangeEvent {
            event_type: kind,
            filename: filename.to_string(),
            project_id: project.to_string(),
            timestamp: 1,
            path: PathBuf::from("/tmp").join(filename),
        }
    }

    #[test]
    fn key_renders_type_filename_project() {
        let event = event(ChangeKind::Change, "MDT-001.md", "MDT");
        assert_eq!(event.key().to_string(), "change:MDT-001.md:MDT");
    }

    #[test]
    fn keys_ignore_timestamp_and_path() {
        let mut a = event(ChangeKind::Add, "a.md", "P");
        let mut b = a.clone();
        a.timestamp = 10;
        b.timestamp = 20;
        b.path = PathBuf::from("/elsewhere/a.md");
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn registry_stem_is_project_name() {
        let event = event(ChangeKind::Add, "alpha.toml", REGISTRY_PROJECT_ID);
        assert!(event.is_registry());
        assert_eq!(event.file_stem(), "alpha");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn change_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ChangeKind::Unlink).unwrap();
        assert_eq!(json, "\"unlink\"");
    }
}
