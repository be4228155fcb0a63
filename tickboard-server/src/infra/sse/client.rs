use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tickboard_model::OutboundMessage;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ClientSendError {
    /// The client's stream was dropped (socket closed or request aborted).
    #[error("client connection closed")]
    Closed,
    /// The client stopped reading and its buffer is full.
    #[error("client outbound buffer is full")]
    Lagging,
}

/// One connected push client.
pub struct Client {
    /// Unique connection ID
    pub id: Uuid,
    pub connected_at: DateTime<Utc>,
    /// Channel feeding this client's response stream
    sender: mpsc::Sender<OutboundMessage>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .field("channel_closed", &self.sender.is_closed())
            .finish()
    }
}

impl Client {
    pub fn new(sender: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            id: Uuid::now_v7(),
            connected_at: Utc::now(),
            sender,
        }
    }

    /// Queue a message without waiting. A full or closed channel is a
    /// failed write.
    pub fn send(&self, message: OutboundMessage) -> Result<(), ClientSendError> {
        self.sender.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => ClientSendError::Lagging,
            TrySendError::Closed(_) => ClientSendError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
