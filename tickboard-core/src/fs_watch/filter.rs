use std::path::{Component, Path};

use tickboard_model::WatchedPath;

/// Decides which raw notifications are worth debouncing.
///
/// Project roots only pass ticket files, the registry root only passes
/// project registry files. Hidden entries and editor leftovers are dropped
/// everywhere.
#[derive(Debug, Clone)]
pub struct EventFilter {
    ticket_extensions: Vec<String>,
    registry_extensions: Vec<String>,
}

impl EventFilter {
    pub fn new(
        ticket_extensions: Vec<String>,
        registry_extensions: Vec<String>,
    ) -> Self {
        Self {
            ticket_extensions,
            registry_extensions,
        }
    }

    /// `path` must already be known to live under `root`.
    pub fn accepts(&self, watched: &WatchedPath, root: &Path, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        if is_editor_artifact(name) {
            return false;
        }

        if let Ok(rel) = path.strip_prefix(root)
            && rel.components().any(|component| match component {
                Component::Normal(seg) => {
                    seg.to_str().is_some_and(|seg| seg.starts_with('.'))
                }
                _ => false,
            })
        {
            return false;
        }

        let allowed = if watched.is_registry() {
            &self.registry_extensions
        } else {
            &self.ticket_extensions
        };

        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                allowed.iter().any(|candidate| candidate.eq_ignore_ascii_case(ext))
            })
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new(vec!["md".to_string()], vec!["toml".to_string()])
    }
}

fn is_editor_artifact(name: &str) -> bool {
    name.starts_with('.')
        || name.ends_with('~')
        || name.ends_with(".swp")
        || name.ends_with(".swx")
        || name.ends_with(".tmp")
}
