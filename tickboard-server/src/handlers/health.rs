use axum::{extract::State, response::Json};
use serde_json::{Value, json};
use tracing::debug;

use crate::infra::app_state::AppState;

pub async fn ping_handler() -> Json<Value> {
    debug!("Ping endpoint called");
    Json(json!({
        "status": "ok",
        "message": "tickboard server is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let watcher = &state.file_watcher;
    let watched: Vec<Value> = watcher
        .watched_paths()
        .await
        .into_iter()
        .map(|path| json!({ "id": path.id, "path": path.path }))
        .collect();

    let status = if watcher.is_running() { "healthy" } else { "stopped" };
    Json(json!({
        "status": status,
        "clients": watcher.client_count(),
        "watchedPaths": watched,
        "queuedEvents": watcher.broadcaster().queue().len(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
