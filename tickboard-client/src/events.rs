//! Application-level events re-emitted from push frames.

use std::{fmt, sync::Arc, time::Duration};

use tickboard_model::{ChangeKind, MessageType, OutboundMessage, TicketSummary};

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketChange {
    pub project_id: String,
    pub filename: String,
    pub timestamp: Option<i64>,
    /// `None` when the server could not attach the ticket; refetch it.
    pub ticket: Option<TicketSummary>,
    pub event_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectChange {
    pub project_id: String,
    pub timestamp: Option<i64>,
    pub event_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    TicketCreated(TicketChange),
    TicketUpdated(TicketChange),
    TicketDeleted(TicketChange),
    ProjectCreated(ProjectChange),
    ProjectDeleted(ProjectChange),
    Connected,
    /// Connected again after an outage. Anything sent in between is lost,
    /// so listeners should resync.
    Reconnected,
    Reconnecting { attempt: u32, delay: Duration },
    Disconnected,
    Error(Arc<ClientError>),
    /// Reconnect attempts exhausted. No further attempts are made.
    Fatal(Arc<ClientError>),
}

impl AppEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::TicketCreated(_) => "ticket:created",
            AppEvent::TicketUpdated(_) => "ticket:updated",
            AppEvent::TicketDeleted(_) => "ticket:deleted",
            AppEvent::ProjectCreated(_) => "project:created",
            AppEvent::ProjectDeleted(_) => "project:deleted",
            AppEvent::Connected => "sse:connected",
            AppEvent::Reconnected => "sse:reconnected",
            AppEvent::Reconnecting { .. } => "sse:reconnecting",
            AppEvent::Disconnected => "sse:disconnected",
            AppEvent::Error(_) => "sse:error",
            AppEvent::Fatal(_) => "sse:fatal",
        }
    }

    /// Map a push frame to the event the application cares about.
    ///
    /// Heartbeats, connection greetings and unknown types map to `None`.
    pub fn from_message(message: OutboundMessage) -> Option<AppEvent> {
        let OutboundMessage { kind, data } = message;
        match kind {
            MessageType::FileChange => {
                let (Some(event_type), Some(project_id), Some(filename)) =
                    (data.event_type, data.project_id, data.filename)
                else {
                    log::warn!("Dropping file-change message without event type, project or filename");
                    return None;
                };
                let change = TicketChange {
                    project_id,
                    filename,
                    timestamp: data.timestamp,
                    ticket: data.ticket_data.flatten(),
                    event_id: data.event_id,
                };
                Some(match event_type {
                    ChangeKind::Add => AppEvent::TicketCreated(change),
                    ChangeKind::Change => AppEvent::TicketUpdated(change),
                    ChangeKind::Unlink => AppEvent::TicketDeleted(change),
                })
            }
            MessageType::ProjectCreated | MessageType::ProjectDeleted => {
                let Some(project_id) = data.project_id else {
                    log::warn!("Dropping {} message without projectId", kind.as_str());
                    return None;
                };
                let change = ProjectChange {
                    project_id,
                    timestamp: data.timestamp,
                    event_id: data.event_id,
                };
                Some(if kind == MessageType::ProjectCreated {
                    AppEvent::ProjectCreated(change)
                } else {
                    AppEvent::ProjectDeleted(change)
                })
            }
            MessageType::Heartbeat => {
                log::trace!("Received heartbeat");
                None
            }
            MessageType::Connection => {
                log::debug!("Server greeting: {:?}", data.status);
                None
            }
            MessageType::Unknown => {
                log::debug!("Ignoring push message of unknown type");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickboard_model::MessageData;

    fn parse(raw: &str) -> OutboundMessage {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn file_changes_map_to_ticket_events() {
        let cases = [
            ("add", "ticket:created"),
            ("change", "ticket:updated"),
            ("unlink", "ticket:deleted"),
        ];
        for (event_type, expected) in cases {
            let raw = format!(
                r#"{{"type":"file-change","data":{{"eventType":"{event_type}","filename":"MDT-001.md","projectId":"MDT","eventId":"e1","ticketData":null}}}}"#
            );
            let event = AppEvent::from_message(parse(&raw)).unwrap();
            assert_eq!(event.name(), expected);
        }
    }

    #[test]
    fn ticket_summary_is_carried_through() {
        let message = parse(
            r#"{"type":"file-change","data":{"eventType":"change","filename":"MDT-002.md","projectId":"MDT",
                "ticketData":{"code":"MDT-002","title":"Fix drag","lastModified":"2026-05-01T00:00:00Z"}}}"#,
        );
        let Some(AppEvent::TicketUpdated(change)) = AppEvent::from_message(message) else {
            panic!("expected ticket:updated");
        };
        assert_eq!(change.ticket.unwrap().code, "MDT-002");
        assert_eq!(change.project_id, "MDT");
    }

    #[test]
    fn project_messages_map_to_project_events() {
        let created = parse(r#"{"type":"project-created","data":{"projectId":"API","eventId":"p1"}}"#);
        let deleted = parse(r#"{"type":"project-deleted","data":{"projectId":"API","eventId":"p2"}}"#);
        assert_eq!(AppEvent::from_message(created).unwrap().name(), "project:created");
        assert_eq!(AppEvent::from_message(deleted).unwrap().name(), "project:deleted");
    }

    #[test]
    fn heartbeat_greeting_and_unknown_are_ignored() {
        assert!(AppEvent::from_message(OutboundMessage::heartbeat(1)).is_none());
        assert!(AppEvent::from_message(OutboundMessage::connection(1)).is_none());
        assert!(AppEvent::from_message(parse(r#"{"type":"ticket-moved","data":{}}"#)).is_none());
    }

    #[test]
    fn incomplete_file_change_is_dropped() {
        let message = OutboundMessage::new(
            MessageType::FileChange,
            MessageData {
                filename: Some("MDT-001.md".into()),
                ..MessageData::default()
            },
        );
        assert!(AppEvent::from_message(message).is_none());
    }
}
