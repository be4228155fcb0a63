//! Core data model definitions shared across tickboard crates.
//!
//! The server and the client both depend on this crate so that the push
//! protocol has exactly one definition.
#![allow(missing_docs)]

pub mod message;
pub mod ticket;
pub mod watch;

pub use message::{MessageData, MessageType, OutboundMessage};
pub use ticket::TicketSummary;
pub use watch::{
    ChangeKind, CoalescedChangeEvent, DebounceKey, REGISTRY_PROJECT_ID,
    WatchedPath,
};
