use std::{fmt, sync::Arc, time::Duration};

use chrono::Utc;
use tickboard_core::TicketLookup;
use tickboard_model::{
    ChangeKind, CoalescedChangeEvent, MessageData, MessageType, OutboundMessage,
    TicketSummary,
};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::client_manager::ClientManager;
use super::event_queue::EventQueue;

#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    pub queue_capacity: usize,
    pub heartbeat_interval: Duration,
    /// Upper bound on a single ticket lookup while formatting.
    pub lookup_timeout: Duration,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 50,
            heartbeat_interval: Duration::from_secs(30),
            lookup_timeout: Duration::from_millis(100),
        }
    }
}

/// Result of one [`SseBroadcaster::broadcast`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub removed: usize,
}

/// Turns coalesced changes into push frames and writes them to every
/// connected client.
pub struct SseBroadcaster {
    config: BroadcasterConfig,
    clients: ClientManager,
    queue: EventQueue,
    lookup: Arc<dyn TicketLookup>,
}

impl fmt::Debug for SseBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseBroadcaster")
            .field("config", &self.config)
            .field("clients", &self.clients)
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl SseBroadcaster {
    pub fn new(
        config: BroadcasterConfig,
        clients: ClientManager,
        lookup: Arc<dyn TicketLookup>,
    ) -> Self {
        let queue = EventQueue::new(config.queue_capacity);
        Self {
            config,
            clients,
            queue,
            lookup,
        }
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn config(&self) -> &BroadcasterConfig {
        &self.config
    }

    /// Build the frame for `event`, with a fresh `eventId`.
    ///
    /// Project roots yield `file-change`. Registry additions and removals
    /// yield `project-created` / `project-deleted` keyed by the registry
    /// file's stem; registry edits yield nothing.
    pub async fn format(&self, event: &CoalescedChangeEvent) -> Option<OutboundMessage> {
        if event.is_registry() {
            let kind = match event.event_type {
                ChangeKind::Add => MessageType::ProjectCreated,
                ChangeKind::Unlink => MessageType::ProjectDeleted,
                ChangeKind::Change => {
                    debug!(
                        filename = %event.filename,
                        "registry entry changed; no lifecycle event"
                    );
                    return None;
                }
            };
            return Some(OutboundMessage::new(
                kind,
                MessageData {
                    event_type: Some(event.event_type),
                    filename: Some(event.filename.clone()),
                    project_id: Some(event.file_stem().to_string()),
                    timestamp: Some(event.timestamp),
                    event_id: Some(new_event_id()),
                    ..MessageData::default()
                },
            ));
        }

        let ticket_data = match event.event_type {
            ChangeKind::Unlink => None,
            ChangeKind::Add | ChangeKind::Change => self.lookup_ticket(event).await,
        };

        Some(OutboundMessage::new(
            MessageType::FileChange,
            MessageData {
                event_type: Some(event.event_type),
                filename: Some(event.filename.clone()),
                project_id: Some(event.project_id.clone()),
                timestamp: Some(event.timestamp),
                ticket_data: Some(ticket_data),
                event_id: Some(new_event_id()),
                status: None,
            },
        ))
    }

    async fn lookup_ticket(&self, event: &CoalescedChangeEvent) -> Option<TicketSummary> {
        let lookup = self.lookup.lookup(&event.project_id, &event.path);
        match timeout(self.config.lookup_timeout, lookup).await {
            Ok(Ok(summary)) => summary,
            Ok(Err(err)) => {
                warn!(
                    project_id = %event.project_id,
                    filename = %event.filename,
                    "ticket lookup failed: {err:#}"
                );
                None
            }
            Err(_) => {
                debug!(
                    project_id = %event.project_id,
                    filename = %event.filename,
                    timeout_ms = self.config.lookup_timeout.as_millis() as u64,
                    "ticket lookup timed out"
                );
                None
            }
        }
    }

    /// Write `message` to every live client, queueing it for replay when it
    /// is a de-duplicable frame carrying an `eventId`.
    ///
    /// A client whose write fails is removed; the rest still receive the
    /// message.
    pub fn broadcast(&self, message: OutboundMessage) -> BroadcastReport {
        if message.kind.is_deduplicable() && message.event_id().is_some() {
            self.queue.push(message.clone());
        } else {
            debug!(message_type = message.kind.as_str(), "broadcast without replay");
        }
        self.write_all(&message)
    }

    /// Send one heartbeat frame. Heartbeats are not queued.
    pub fn heartbeat(&self) -> BroadcastReport {
        self.write_all(&OutboundMessage::heartbeat(Utc::now().timestamp_millis()))
    }

    /// Queued messages a client that last saw `event_id` has missed.
    pub fn replay_after(&self, event_id: &str) -> Vec<OutboundMessage> {
        match self.queue.messages_after(event_id) {
            Some(messages) => messages,
            None => {
                debug!(event_id, "last event id not in queue; nothing to replay");
                Vec::new()
            }
        }
    }

    /// Emit a heartbeat every `heartbeat_interval` until cancelled.
    pub fn spawn_heartbeat(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let broadcaster = Arc::clone(self);
        let period = self.config.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = broadcaster.heartbeat();
                        debug!(
                            delivered = report.delivered,
                            removed = report.removed,
                            "heartbeat sent"
                        );
                    }
                }
            }
        })
    }

    fn write_all(&self, message: &OutboundMessage) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for client in self.clients.clients() {
            match client.send(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    warn!(
                        client_id = %client.id,
                        message_type = message.kind.as_str(),
                        "dropping push client: {err}"
                    );
                    if self.clients.remove_client(client.id) {
                        report.removed += 1;
                    }
                }
            }
        }
        report
    }
}

fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::path::{Path, PathBuf};
    use tickboard_core::NoopTicketLookup;
    use tickboard_model::REGISTRY_PROJECT_ID;

    struct FixedLookup(TicketSummary);

    #[async_trait]
    impl TicketLookup for FixedLookup {
        async fn lookup(
            &self,
            _project_id: &str,
            _path: &Path,
        ) -> anyhow::Result<Option<TicketSummary>> {
            Ok(Some(self.0.clone()))
        }
    }

    struct SlowLookup;

    #[async_trait]
    impl TicketLookup for SlowLookup {
        async fn lookup(
            &self,
            _project_id: &str,
            _path: &Path,
        ) -> anyhow::Result<Option<TicketSummary>> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(None)
        }
    }

    struct FailingLookup;

    #[async_trait]
    impl TicketLookup for FailingLookup {
        async fn lookup(
            &self,
            _project_id: &str,
            _path: &Path,
        ) -> anyhow::Result<Option<TicketSummary>> {
            anyhow::bail!("front matter is not valid YAML")
        }
    }

    fn broadcaster(lookup: Arc<dyn TicketLookup>) -> SseBroadcaster {
        SseBroadcaster::new(BroadcasterConfig::default(), ClientManager::new(), lookup)
    }

    fn change(kind: ChangeKind, filename: &str, project: &str) -> CoalescedChangeEvent {
        CoalescedChangeEvent {
            event_type: kind,
            filename: filename.to_string(),
            project_id: project.to_string(),
            timestamp: 1_700_000_000_000,
            path: PathBuf::from("/board").join(filename),
        }
    }

    fn summary() -> TicketSummary {
        TicketSummary {
            code: "MDT-001".into(),
            title: "Push updates".into(),
            status: "In Progress".into(),
            ticket_type: "Feature Enhancement".into(),
            priority: "High".into(),
            last_modified: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn formats_file_change_with_ticket_data() {
        let broadcaster = broadcaster(Arc::new(FixedLookup(summary())));
        let message = broadcaster
            .format(&change(ChangeKind::Change, "MDT-001.md", "MDT"))
            .await
            .unwrap();

        assert_eq!(message.kind, MessageType::FileChange);
        assert_eq!(message.data.event_type, Some(ChangeKind::Change));
        assert_eq!(message.data.project_id.as_deref(), Some("MDT"));
        assert_eq!(message.data.ticket_data, Some(Some(summary())));
        assert!(message.event_id().is_some());
    }

    #[tokio::test]
    async fn event_ids_are_unique() {
        let broadcaster = broadcaster(Arc::new(NoopTicketLookup));
        let event = change(ChangeKind::Add, "MDT-002.md", "MDT");
        let a = broadcaster.format(&event).await.unwrap();
        let b = broadcaster.format(&event).await.unwrap();
        assert_ne!(a.event_id(), b.event_id());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookup_yields_null_ticket_data() {
        let broadcaster = broadcaster(Arc::new(SlowLookup));
        let message = broadcaster
            .format(&change(ChangeKind::Add, "MDT-003.md", "MDT"))
            .await
            .unwrap();
        assert_eq!(message.data.ticket_data, Some(None));
    }

    #[tokio::test]
    async fn failed_lookup_yields_null_ticket_data() {
        let broadcaster = broadcaster(Arc::new(FailingLookup));
        let message = broadcaster
            .format(&change(ChangeKind::Change, "MDT-003.md", "MDT"))
            .await
            .unwrap();
        assert_eq!(message.data.ticket_data, Some(None));
    }

    #[tokio::test]
    async fn unlink_skips_lookup() {
        let broadcaster = broadcaster(Arc::new(FixedLookup(summary())));
        let message = broadcaster
            .format(&change(ChangeKind::Unlink, "MDT-004.md", "MDT"))
            .await
            .unwrap();
        assert_eq!(message.data.event_type, Some(ChangeKind::Unlink));
        assert_eq!(message.data.ticket_data, Some(None));
    }

    #[tokio::test]
    async fn registry_changes_route_to_project_lifecycle() {
        let broadcaster = broadcaster(Arc::new(NoopTicketLookup));

        let created = broadcaster
            .format(&change(ChangeKind::Add, "alpha.toml", REGISTRY_PROJECT_ID))
            .await
            .unwrap();
        assert_eq!(created.kind, MessageType::ProjectCreated);
        assert_eq!(created.data.project_id.as_deref(), Some("alpha"));
        assert!(created.event_id().is_some());

        let deleted = broadcaster
            .format(&change(ChangeKind::Unlink, "alpha.toml", REGISTRY_PROJECT_ID))
            .await
            .unwrap();
        assert_eq!(deleted.kind, MessageType::ProjectDeleted);

        assert!(
            broadcaster
                .format(&change(ChangeKind::Change, "alpha.toml", REGISTRY_PROJECT_ID))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn failing_client_is_removed_and_others_still_receive() {
        let broadcaster = broadcaster(Arc::new(NoopTicketLookup));
        let clients = broadcaster.clients().clone();
        let (_a, mut rx_a) = clients.register(8);
        let (_b, mut rx_b) = clients.register(8);
        let (_c, rx_c) = clients.register(8);
        drop(rx_c);

        let message = broadcaster
            .format(&change(ChangeKind::Change, "MDT-005.md", "MDT"))
            .await
            .unwrap();
        let report = broadcaster.broadcast(message.clone());

        assert_eq!(report, BroadcastReport { delivered: 2, removed: 1 });
        assert_eq!(clients.client_count(), 2);
        assert_eq!(rx_a.recv().await.unwrap(), message);
        assert_eq!(rx_b.recv().await.unwrap(), message);
    }

    #[tokio::test]
    async fn lagging_client_is_removed() {
        let broadcaster = broadcaster(Arc::new(NoopTicketLookup));
        let (_slow, _rx) = broadcaster.clients().register(1);

        broadcaster.heartbeat();
        let report = broadcaster.heartbeat();
        assert_eq!(report.removed, 1);
        assert_eq!(broadcaster.clients().client_count(), 0);
    }

    #[tokio::test]
    async fn broadcast_bounds_queue_and_heartbeat_skips_it() {
        let broadcaster = broadcaster(Arc::new(NoopTicketLookup));
        for i in 0..60 {
            let message = broadcaster
                .format(&change(ChangeKind::Change, &format!("MDT-{i:03}.md"), "MDT"))
                .await
                .unwrap();
            broadcaster.broadcast(message);
        }
        broadcaster.heartbeat();

        let queued = broadcaster.queue().snapshot();
        assert_eq!(queued.len(), 50);
        assert!(queued.iter().all(|m| m.kind == MessageType::FileChange));
        assert_eq!(queued[0].data.filename.as_deref(), Some("MDT-010.md"));
    }

    #[tokio::test]
    async fn only_frames_with_event_ids_are_queued() {
        let broadcaster = broadcaster(Arc::new(NoopTicketLookup));
        let (_client, mut rx) = broadcaster.clients().register(8);

        let report = broadcaster.broadcast(OutboundMessage::connection(1));
        assert_eq!(report.delivered, 1);
        assert_eq!(rx.recv().await.unwrap().kind, MessageType::Connection);

        let without_id = OutboundMessage::new(MessageType::FileChange, MessageData::default());
        broadcaster.broadcast(without_id);
        assert!(broadcaster.queue().is_empty());
    }

    #[tokio::test]
    async fn replay_after_returns_newer_messages() {
        let broadcaster = broadcaster(Arc::new(NoopTicketLookup));
        let mut ids = Vec::new();
        for i in 0..3 {
            let message = broadcaster
                .format(&change(ChangeKind::Add, &format!("MDT-{i}.md"), "MDT"))
                .await
                .unwrap();
            ids.push(message.event_id().unwrap().to_string());
            broadcaster.broadcast(message);
        }

        let replay = broadcaster.replay_after(&ids[0]);
        let replayed: Vec<_> = replay.iter().filter_map(|m| m.event_id()).collect();
        assert_eq!(replayed, vec![ids[1].as_str(), ids[2].as_str()]);
        assert!(broadcaster.replay_after("unknown").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_task_ticks_until_cancelled() {
        let broadcaster = Arc::new(SseBroadcaster::new(
            BroadcasterConfig {
                heartbeat_interval: Duration::from_secs(30),
                ..BroadcasterConfig::default()
            },
            ClientManager::new(),
            Arc::new(NoopTicketLookup),
        ));
        let (_client, mut rx) = broadcaster.clients().register(8);
        let cancel = CancellationToken::new();
        let task = broadcaster.spawn_heartbeat(cancel.clone());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, MessageType::Heartbeat);
        assert!(first.event_id().is_none());
        let second = rx.recv().await.unwrap();
        assert_eq!(second.kind, MessageType::Heartbeat);

        cancel.cancel();
        task.await.unwrap();
    }
}
