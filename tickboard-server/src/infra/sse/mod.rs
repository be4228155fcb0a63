pub mod broadcaster;
pub mod client;
pub mod client_manager;
pub mod event_queue;

pub use broadcaster::{BroadcastReport, BroadcasterConfig, SseBroadcaster};
pub use client::{Client, ClientSendError};
pub use client_manager::{ClientGuard, ClientManager};
pub use event_queue::EventQueue;
