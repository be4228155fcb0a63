use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::{events_sse_handler, health_handler, ping_handler};
use crate::infra::app_state::AppState;

pub fn create_api_router() -> Router<AppState> {
    Router::new().route("/events", get(events_sse_handler))
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping_handler))
        .route("/health", get(health_handler))
        .nest("/api", create_api_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
