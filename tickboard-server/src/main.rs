//! # Tickboard Server
//!
//! Watches the configured ticket folders and the global project registry,
//! and pushes every coalesced change to connected boards over SSE.

use anyhow::Context;
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tickboard_config::{Config, ConfigLoad, ConfigLoader};
use tickboard_core::ProjectDiscovery;
use tickboard_server::{
    AppState,
    infra::{discovery::ConfiguredProjects, startup::build_default_app_state},
    routes::create_app,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "tickboard-server")]
#[command(about = "Real-time change notifications for markdown ticket boards")]
struct Cli {
    /// Path to tickboard.toml (overrides the default locations)
    #[arg(short, long, env = "TICKBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_runtime_config(&cli)?;
    run_server(config).await
}

fn load_runtime_config(cli: &Cli) -> anyhow::Result<Arc<Config>> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host.clone() {
        config.server.host = host;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Quiet defaults. Override via RUST_LOG.
                "info,tower_http=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }

    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => {
                warn!(message = %warning.message, "configuration warning")
            }
        }
    }

    info!(
        watch.debounce_ms = config.watch.debounce_window.as_millis() as u64,
        watch.projects = config.projects.len(),
        watch.registry = config.watch.registry_dir.is_some(),
        sse.heartbeat_secs = config.sse.heartbeat_interval.as_secs(),
        sse.queue_capacity = config.sse.event_queue_capacity,
        "pipeline configuration in effect"
    );

    Ok(Arc::new(config))
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    let state = build_default_app_state(Arc::clone(&config));
    let discovery = ConfiguredProjects::from_config(&config);

    let summary = state
        .file_watcher
        .start(discovery.watched_paths())
        .await
        .context("failed to start file watchers")?;
    for failure in &summary.failed {
        warn!("{failure}");
    }
    info!(
        watching = ?summary.watching,
        "file watchers running"
    );

    let host = config.server.host.as_str();
    let port = config.server.port;
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;
    let addr = listener.local_addr().context("listener has no local address")?;
    info!("Starting tickboard server on http://{addr}");

    let router = create_app(state.clone());
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .context("server error")?;

    state.file_watcher.stop().await;
    info!("tickboard server stopped");
    Ok(())
}

/// Resolves on Ctrl-C after tearing the pipeline down, so open push streams
/// end and the server can drain.
async fn shutdown_signal(state: AppState) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
    state.file_watcher.stop().await;
}
