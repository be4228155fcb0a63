//! # Tickboard Server
//!
//! Serves the push endpoint of a markdown ticket board. Project folders are
//! watched through `tickboard-core`; every coalesced change becomes one
//! JSON frame on `GET /api/events`, written to all connected clients.

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
