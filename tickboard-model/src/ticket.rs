use chrono::{DateTime, Utc};

/// Parsed header of a ticket file, attached to `file-change` messages when
/// the ticket service can supply it in time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TicketSummary {
    pub code: String,
    pub title: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub status: String,
    #[cfg_attr(feature = "serde", serde(rename = "type", default))]
    pub ticket_type: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub priority: String,
    pub last_modified: DateTime<Utc>,
}
