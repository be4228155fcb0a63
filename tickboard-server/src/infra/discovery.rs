use std::fmt;

use tickboard_config::Config;
use tickboard_core::ProjectDiscovery;
use tickboard_model::{REGISTRY_PROJECT_ID, WatchedPath};
use tracing::warn;

/// Projects listed in the loaded configuration, plus the global registry
/// directory when one exists.
#[derive(Clone)]
pub struct ConfiguredProjects {
    paths: Vec<WatchedPath>,
}

impl ConfiguredProjects {
    pub fn from_config(config: &Config) -> Self {
        let mut paths = Vec::with_capacity(config.projects.len() + 1);
        for project in &config.projects {
            if project.id == REGISTRY_PROJECT_ID {
                warn!(
                    path = %project.path.display(),
                    "project id '{REGISTRY_PROJECT_ID}' is reserved; entry skipped"
                );
                continue;
            }
            paths.push(WatchedPath::new(project.id.clone(), project.path.clone()));
        }
        if let Some(registry) = &config.watch.registry_dir {
            paths.push(WatchedPath::registry(registry.clone()));
        }
        Self { paths }
    }
}

impl ProjectDiscovery for ConfiguredProjects {
    fn watched_paths(&self) -> Vec<WatchedPath> {
        self.paths.clone()
    }
}

impl fmt::Debug for ConfiguredProjects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<_> = self.paths.iter().map(|p| p.id.as_str()).collect();
        f.debug_struct("ConfiguredProjects").field("ids", &ids).finish()
    }
}
