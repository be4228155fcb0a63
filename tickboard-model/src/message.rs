//! Push protocol frames.
//!
//! Every frame is a single JSON object `{ "type": ..., "data": { ... } }`.
//! De-duplicable frames carry `data.eventId`; `heartbeat` and `connection`
//! frames never do.

use crate::{ChangeKind, TicketSummary};

/// Tag of an [`OutboundMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum MessageType {
    FileChange,
    ProjectCreated,
    ProjectDeleted,
    Heartbeat,
    Connection,
    /// Any tag this build does not know about. Receivers ignore it.
    #[cfg_attr(feature = "serde", serde(other))]
    Unknown,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::FileChange => "file-change",
            MessageType::ProjectCreated => "project-created",
            MessageType::ProjectDeleted => "project-deleted",
            MessageType::Heartbeat => "heartbeat",
            MessageType::Connection => "connection",
            MessageType::Unknown => "unknown",
        }
    }

    /// Whether frames of this type carry an `eventId`.
    pub fn is_deduplicable(&self) -> bool {
        matches!(
            self,
            MessageType::FileChange
                | MessageType::ProjectCreated
                | MessageType::ProjectDeleted
        )
    }
}

/// Payload of an [`OutboundMessage`]. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MessageData {
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub event_type: Option<ChangeKind>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub filename: Option<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub project_id: Option<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub timestamp: Option<i64>,
    /// `Some(None)` serializes as `"ticketData": null`, which tells the
    /// receiver to refetch the ticket itself.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub ticket_data: Option<Option<TicketSummary>>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub event_id: Option<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub status: Option<String>,
}

/// The unit written to push clients.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutboundMessage {
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: MessageType,
    #[cfg_attr(feature = "serde", serde(default))]
    pub data: MessageData,
}

impl OutboundMessage {
    pub fn new(kind: MessageType, data: MessageData) -> Self {
        Self { kind, data }
    }

    pub fn heartbeat(timestamp: i64) -> Self {
        Self::new(
            MessageType::Heartbeat,
            MessageData {
                timestamp: Some(timestamp),
                ..MessageData::default()
            },
        )
    }

    pub fn connection(timestamp: i64) -> Self {
        Self::new(
            MessageType::Connection,
            MessageData {
                status: Some("connected".to_string()),
                timestamp: Some(timestamp),
                ..MessageData::default()
            },
        )
    }

    pub fn event_id(&self) -> Option<&str> {
        self.data.event_id.as_deref()
    }
}
