#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tempfile::TempDir;
use tickboard_config::{Config, ProjectConfig, WatchSettings};
use tickboard_core::ProjectDiscovery;
use tickboard_model::{MessageType, OutboundMessage};
use tickboard_server::{
    AppState,
    infra::{discovery::ConfiguredProjects, startup::build_default_app_state},
    routes::create_app,
};
use tokio::sync::mpsc;

pub const PROJECT_ID: &str = "MDT";

/// A pipeline over one project folder and a registry folder, both temporary.
pub struct TestApp {
    pub state: AppState,
    pub project_dir: TempDir,
    pub registry_dir: TempDir,
}

impl TestApp {
    pub fn new() -> anyhow::Result<Self> {
        let project_dir = tempfile::tempdir()?;
        let registry_dir = tempfile::tempdir()?;

        let config = Config {
            watch: WatchSettings {
                registry_dir: Some(registry_dir.path().to_path_buf()),
                ..WatchSettings::default()
            },
            projects: vec![ProjectConfig {
                id: PROJECT_ID.to_string(),
                path: project_dir.path().to_path_buf(),
            }],
            ..Config::default()
        };
        let state = build_default_app_state(Arc::new(config));

        Ok(Self {
            state,
            project_dir,
            registry_dir,
        })
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let discovery = ConfiguredProjects::from_config(&self.state.config);
        let summary = self
            .state
            .file_watcher
            .start(discovery.watched_paths())
            .await?;
        anyhow::ensure!(summary.failed.is_empty(), "watch setup failed: {:?}", summary.failed);
        Ok(())
    }

    pub fn router(&self) -> Router {
        create_app(self.state.clone())
    }
}

/// Wait for the next message of `kind`, skipping anything else.
pub async fn next_of_kind(
    rx: &mut mpsc::Receiver<OutboundMessage>,
    kind: MessageType,
    within: Duration,
) -> Option<OutboundMessage> {
    tokio::time::timeout(within, async {
        while let Some(message) = rx.recv().await {
            if message.kind == kind {
                return Some(message);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}
