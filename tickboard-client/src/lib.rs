//! # Tickboard Client
//!
//! Receiving end of the tickboard push stream.
//!
//! [`SseClient`] keeps one connection open through a [`Transport`], drops
//! frames whose `eventId` it has already seen, reconnects with exponential
//! backoff and republishes every frame as an [`AppEvent`] on a broadcast
//! channel. After a reconnect it emits [`AppEvent::Reconnected`] so the
//! application can resync whatever it missed while offline.

#![allow(missing_docs)]

pub mod backoff;
pub mod cache;
pub mod client;
pub mod error;
pub mod events;
pub mod transport;

pub use backoff::{Backoff, BackoffConfig};
pub use cache::EventCache;
pub use client::{ClientConfig, SseClient};
pub use error::ClientError;
pub use events::{AppEvent, ConnectionState, ProjectChange, TicketChange};
pub use transport::{
    EVENTS_PATH, EventSourceTransport, Transport, TransportConnection,
    TransportEvent,
};
