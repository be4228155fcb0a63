//! Interfaces to the parts of the board that live outside the change
//! pipeline: the ticket/document service and project discovery.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use tickboard_model::{TicketSummary, WatchedPath};

/// Resolves a changed ticket file to a summary the board can render without
/// a refetch.
///
/// Callers bound every lookup with a timeout; an `Err`, `Ok(None)` or a
/// timeout all produce `ticketData: null` on the wire.
#[async_trait]
pub trait TicketLookup: Send + Sync {
    async fn lookup(
        &self,
        project_id: &str,
        path: &Path,
    ) -> anyhow::Result<Option<TicketSummary>>;
}

/// Lookup used when no ticket service is wired in. Every change is sent
/// without ticket data.
#[derive(Default, Clone, Copy)]
pub struct NoopTicketLookup;

#[async_trait]
impl TicketLookup for NoopTicketLookup {
    async fn lookup(
        &self,
        _project_id: &str,
        _path: &Path,
    ) -> anyhow::Result<Option<TicketSummary>> {
        Ok(None)
    }
}

impl fmt::Debug for NoopTicketLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NoopTicketLookup")
    }
}

/// Supplies the directories to watch: one per project plus, optionally, the
/// global project registry.
pub trait ProjectDiscovery: Send + Sync {
    fn watched_paths(&self) -> Vec<WatchedPath>;
}
