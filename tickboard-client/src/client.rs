//! Reconnecting push client.
//!
//! One driver task per [`SseClient::connect`] call owns the connection, the
//! dedup cache and the retry schedule. `connect` replaces any previous
//! driver and `disconnect` stops it, so at most one connection or pending
//! retry exists at a time.

use std::{fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tickboard_model::OutboundMessage;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backoff::{Backoff, BackoffConfig};
use crate::cache::{DEFAULT_CAPACITY, DEFAULT_TTL, EventCache};
use crate::error::ClientError;
use crate::events::{AppEvent, ConnectionState};
use crate::transport::{Transport, TransportConnection, TransportEvent};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backoff: BackoffConfig,
    pub dedup_ttl: Duration,
    pub dedup_capacity: usize,
    /// Capacity of the [`AppEvent`] broadcast channel.
    pub event_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            dedup_ttl: DEFAULT_TTL,
            dedup_capacity: DEFAULT_CAPACITY,
            event_buffer: 256,
        }
    }
}

pub struct SseClient<T: Transport> {
    transport: Arc<T>,
    config: ClientConfig,
    state: Arc<Mutex<ConnectionState>>,
    events: broadcast::Sender<AppEvent>,
    driver: Mutex<Option<DriverHandle>>,
}

struct DriverHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl<T: Transport> fmt::Debug for SseClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseClient")
            .field("state", &*self.state.lock())
            .field("config", &self.config)
            .field("subscribers", &self.events.receiver_count())
            .finish()
    }
}

impl<T: Transport> SseClient<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            transport: Arc::new(transport),
            config,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            events,
            driver: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Open the push connection, replacing any current connection or
    /// pending retry.
    pub async fn connect(&self) {
        self.stop_driver().await;

        let cancel = CancellationToken::new();
        let driver = Driver {
            transport: Arc::clone(&self.transport),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            cache: EventCache::new(self.config.dedup_ttl, self.config.dedup_capacity),
            backoff: Backoff::new(self.config.backoff),
            last_event_id: None,
            recovering: false,
            cancel: cancel.clone(),
        };
        driver.set_state(ConnectionState::Connecting);
        let task = tokio::spawn(driver.run());

        *self.driver.lock() = Some(DriverHandle { cancel, task });
    }

    /// Close the connection and cancel any pending retry. No reconnect
    /// happens until the next [`connect`](Self::connect).
    pub async fn disconnect(&self) {
        let was_active = self.stop_driver().await;
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, ConnectionState::Disconnected)
        };
        if was_active && previous != ConnectionState::Disconnected {
            log::info!("Push connection closed by caller");
            let _ = self.events.send(AppEvent::Disconnected);
        }
    }

    async fn stop_driver(&self) -> bool {
        let driver = self.driver.lock().take();
        let Some(driver) = driver else {
            return false;
        };
        driver.cancel.cancel();
        if let Err(err) = driver.task.await
            && err.is_panic()
        {
            log::error!("Push client driver panicked: {}", err);
        }
        true
    }
}

impl<T: Transport> Drop for SseClient<T> {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.cancel.cancel();
            driver.task.abort();
        }
    }
}

enum Outcome {
    Cancelled,
    Lost(String),
}

struct Driver<T: Transport> {
    transport: Arc<T>,
    state: Arc<Mutex<ConnectionState>>,
    events: broadcast::Sender<AppEvent>,
    cache: EventCache,
    backoff: Backoff,
    last_event_id: Option<String>,
    /// Set while recovering from a lost connection; cleared on the next open.
    recovering: bool,
    cancel: CancellationToken,
}

impl<T: Transport> Driver<T> {
    async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            let mut connection = self.transport.open(self.last_event_id.as_deref());
            let outcome = self.pump(&mut connection).await;
            drop(connection);

            let reason = match outcome {
                Outcome::Cancelled => return,
                Outcome::Lost(reason) => reason,
            };
            log::warn!("Push connection lost: {}", reason);
            self.emit(AppEvent::Error(Arc::new(ClientError::Transport(reason))));

            let Some(delay) = self.backoff.next_delay() else {
                let attempts = self.backoff.attempt();
                log::error!("Max reconnect attempts ({}) exceeded for push connection", attempts);
                self.set_state(ConnectionState::Disconnected);
                self.emit(AppEvent::Fatal(Arc::new(ClientError::Exhausted { attempts })));
                self.emit(AppEvent::Disconnected);
                return;
            };

            let attempt = self.backoff.attempt();
            self.recovering = true;
            self.set_state(ConnectionState::Reconnecting);
            log::info!(
                "Retrying push connection after {} ms (attempt #{})",
                delay.as_millis(),
                attempt
            );
            self.emit(AppEvent::Reconnecting { attempt, delay });

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn pump(&mut self, connection: &mut TransportConnection) -> Outcome {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Outcome::Cancelled,
                event = connection.recv() => event,
            };

            match event {
                Some(TransportEvent::Open) => self.on_open(),
                Some(TransportEvent::Message(msg)) => self.on_message(msg),
                Some(TransportEvent::Error(reason)) => return Outcome::Lost(reason),
                Some(TransportEvent::Closed) | None => {
                    return Outcome::Lost("stream ended".to_string());
                }
            }
        }
    }

    fn on_open(&mut self) {
        log::info!("Push connection opened");
        self.backoff.reset();
        self.set_state(ConnectionState::Connected);
        self.emit(AppEvent::Connected);
        if self.recovering {
            self.recovering = false;
            self.emit(AppEvent::Reconnected);
        }
    }

    fn on_message(&mut self, msg: eventsource_stream::Event) {
        if msg.data.trim().is_empty() {
            return;
        }

        let message = match serde_json::from_str::<OutboundMessage>(&msg.data) {
            Ok(message) => message,
            Err(err) => {
                log::error!("Failed to parse push message: {} - Data: {}", err, msg.data);
                self.emit(AppEvent::Error(Arc::new(ClientError::Malformed(err))));
                return;
            }
        };

        if let Some(event_id) = message.event_id() {
            if !self.cache.check_and_record(event_id, Instant::now()) {
                log::debug!("Dropping duplicate push message {}", event_id);
                return;
            }
            self.last_event_id = Some(event_id.to_string());
        }

        if let Some(event) = AppEvent::from_message(message) {
            log::debug!("Push event {}", event.name());
            self.emit(event);
        }
    }

    fn set_state(&self, next: ConnectionState) {
        *self.state.lock() = next;
    }

    fn emit(&self, event: AppEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tokio::sync::mpsc;

    enum Script {
        Fail(&'static str),
        /// Open, deliver the frames, then stay open until closed by the test.
        Open(Vec<String>),
    }

    #[derive(Default)]
    struct ScriptedTransport {
        scripts: Mutex<VecDeque<Script>>,
        live: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
        opens: Mutex<Vec<(Instant, Option<String>)>>,
    }

    impl ScriptedTransport {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                ..Self::default()
            })
        }

        fn close_live(&self) {
            self.live.lock().take();
        }

        fn push(&self, data: &str) {
            let live = self.live.lock();
            live.as_ref()
                .unwrap()
                .send(TransportEvent::Message(frame(data)))
                .unwrap();
        }

        fn open_count(&self) -> usize {
            self.opens.lock().len()
        }
    }

    impl Transport for Arc<ScriptedTransport> {
        fn open(&self, last_event_id: Option<&str>) -> TransportConnection {
            self.opens
                .lock()
                .push((Instant::now(), last_event_id.map(str::to_string)));
            let (tx, rx) = mpsc::unbounded_channel();
            match self.scripts.lock().pop_front() {
                Some(Script::Open(frames)) => {
                    tx.send(TransportEvent::Open).unwrap();
                    for data in frames {
                        tx.send(TransportEvent::Message(frame(&data))).unwrap();
                    }
                    *self.live.lock() = Some(tx);
                }
                Some(Script::Fail(reason)) => {
                    tx.send(TransportEvent::Error(reason.to_string())).unwrap();
                }
                None => {
                    tx.send(TransportEvent::Error("refused".to_string())).unwrap();
                }
            }
            TransportConnection::new(rx)
        }
    }

    fn frame(data: &str) -> eventsource_stream::Event {
        eventsource_stream::Event {
            event: "message".to_string(),
            data: data.to_string(),
            id: String::new(),
            retry: None,
        }
    }

    fn ticket_added(event_id: &str) -> String {
        format!(
            r#"{{"type":"file-change","data":{{"eventType":"add","filename":"MDT-001.md","projectId":"MDT","eventId":"{event_id}","ticketData":null}}}}"#
        )
    }

    fn client(transport: &Arc<ScriptedTransport>) -> SseClient<Arc<ScriptedTransport>> {
        SseClient::new(Arc::clone(transport), ClientConfig::default())
    }

    async fn next_named(rx: &mut broadcast::Receiver<AppEvent>, name: &str) -> AppEvent {
        loop {
            let event = rx.recv().await.unwrap();
            if event.name() == name {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_sequence_then_terminal_disconnect() {
        let transport = ScriptedTransport::new(Vec::new());
        let client = client(&transport);
        let mut rx = client.subscribe();
        client.connect().await;

        let mut delays = Vec::new();
        loop {
            match rx.recv().await.unwrap() {
                AppEvent::Reconnecting { attempt, delay } => {
                    assert_eq!(attempt as usize, delays.len() + 1);
                    delays.push(delay.as_millis());
                }
                AppEvent::Fatal(err) => {
                    assert!(matches!(*err, ClientError::Exhausted { attempts: 5 }));
                    break;
                }
                _ => {}
            }
        }
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
        assert!(matches!(rx.recv().await.unwrap(), AppEvent::Disconnected));
        assert_eq!(client.state(), ConnectionState::Disconnected);

        // Initial attempt plus five retries, spaced by the scheduled delays.
        tokio::time::sleep(Duration::from_secs(120)).await;
        let opens = transport.opens.lock().clone();
        assert_eq!(opens.len(), 6);
        let gaps: Vec<u128> = opens
            .windows(2)
            .map(|pair| (pair[1].0 - pair[0].0).as_millis())
            .collect();
        assert_eq!(gaps, vec![1000, 2000, 4000, 8000, 16000]);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_emits_exactly_one_reconnected() {
        let transport = ScriptedTransport::new(vec![
            Script::Open(vec![ticket_added("e-1")]),
            Script::Open(Vec::new()),
        ]);
        let client = client(&transport);
        let mut rx = client.subscribe();
        client.connect().await;

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, AppEvent::Connected));
        assert_eq!(next_named(&mut rx, "ticket:created").await.name(), "ticket:created");
        assert_eq!(client.state(), ConnectionState::Connected);

        transport.close_live();
        let AppEvent::Reconnecting { attempt, delay } =
            next_named(&mut rx, "sse:reconnecting").await
        else {
            unreachable!()
        };
        assert_eq!((attempt, delay), (1, Duration::from_secs(1)));

        next_named(&mut rx, "sse:reconnected").await;
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(transport.open_count(), 2);
        // The reconnect asks the server to replay after the last seen id.
        assert_eq!(transport.opens.lock()[1].1.as_deref(), Some("e-1"));

        client.disconnect().await;
        let mut reconnected = 1;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, AppEvent::Reconnected) {
                reconnected += 1;
            }
        }
        assert_eq!(reconnected, 1);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_event_ids_are_dropped_within_ttl() {
        let transport = ScriptedTransport::new(vec![Script::Open(vec![
            ticket_added("dup"),
            ticket_added("dup"),
            ticket_added("other"),
        ])]);
        let client = client(&transport);
        let mut rx = client.subscribe();
        client.connect().await;

        let AppEvent::TicketCreated(first) = next_named(&mut rx, "ticket:created").await else {
            unreachable!()
        };
        let AppEvent::TicketCreated(second) = next_named(&mut rx, "ticket:created").await else {
            unreachable!()
        };
        assert_eq!(first.event_id.as_deref(), Some("dup"));
        assert_eq!(second.event_id.as_deref(), Some("other"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        transport.push(&ticket_added("dup"));
        let AppEvent::TicketCreated(again) = next_named(&mut rx, "ticket:created").await else {
            unreachable!()
        };
        assert_eq!(again.event_id.as_deref(), Some("dup"));

        client.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_message_keeps_connection_open() {
        let transport = ScriptedTransport::new(vec![Script::Open(vec![
            "{not json".to_string(),
            r#"{"type":"heartbeat","data":{"timestamp":1}}"#.to_string(),
            ticket_added("after"),
        ])]);
        let client = client(&transport);
        let mut rx = client.subscribe();
        client.connect().await;

        let AppEvent::Error(err) = next_named(&mut rx, "sse:error").await else {
            unreachable!()
        };
        assert!(matches!(*err, ClientError::Malformed(_)));
        next_named(&mut rx, "ticket:created").await;
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(transport.open_count(), 1);

        client.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_retry() {
        let transport = ScriptedTransport::new(vec![Script::Fail("refused")]);
        let client = client(&transport);
        let mut rx = client.subscribe();
        client.connect().await;

        next_named(&mut rx, "sse:reconnecting").await;
        assert_eq!(client.state(), ConnectionState::Reconnecting);
        client.disconnect().await;
        assert!(matches!(
            next_named(&mut rx, "sse:disconnected").await,
            AppEvent::Disconnected
        ));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.open_count(), 1);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_replaces_previous_connection() {
        let transport = ScriptedTransport::new(vec![
            Script::Open(Vec::new()),
            Script::Open(Vec::new()),
        ]);
        let client = client(&transport);
        let mut rx = client.subscribe();

        client.connect().await;
        next_named(&mut rx, "sse:connected").await;
        client.connect().await;
        next_named(&mut rx, "sse:connected").await;

        assert_eq!(transport.open_count(), 2);
        assert_eq!(client.state(), ConnectionState::Connected);
        client.disconnect().await;
    }
}
