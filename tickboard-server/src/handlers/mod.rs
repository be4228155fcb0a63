pub mod events;
pub mod health;

pub use events::events_sse_handler;
pub use health::{health_handler, ping_handler};
