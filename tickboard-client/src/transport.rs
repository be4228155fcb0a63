//! Connection layer under [`SseClient`](crate::SseClient).
//!
//! A [`Transport`] opens one push connection and reports what happens on it
//! as [`TransportEvent`]s. It never retries on its own; reconnecting is the
//! state machine's job.

use std::fmt;

use futures::StreamExt;
use reqwest_eventsource::{Error as EventSourceError, Event, EventSource, retry::Never};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Path of the push endpoint relative to the server base url.
pub const EVENTS_PATH: &str = "/api/events";

#[derive(Debug)]
pub enum TransportEvent {
    Open,
    Message(eventsource_stream::Event),
    Error(String),
    Closed,
}

/// One open push connection. Dropping it closes the connection.
pub struct TransportConnection {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    task: Option<JoinHandle<()>>,
}

impl TransportConnection {
    pub fn new(events: mpsc::UnboundedReceiver<TransportEvent>) -> Self {
        Self { events, task: None }
    }

    /// Tie a reader task to the connection so it is aborted on drop.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

impl Drop for TransportConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl fmt::Debug for TransportConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConnection")
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

pub trait Transport: Send + Sync + 'static {
    /// Open a connection. `last_event_id` is the newest event id already
    /// processed, so the server can replay what came after it.
    fn open(&self, last_event_id: Option<&str>) -> TransportConnection;
}

/// [`Transport`] over HTTP using `reqwest-eventsource`, with its built-in
/// retry disabled.
#[derive(Debug, Clone)]
pub struct EventSourceTransport {
    url: String,
    http: reqwest::Client,
}

impl EventSourceTransport {
    /// `url` is the full push endpoint url.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Transport for the push endpoint of the server at `base_url`.
    pub fn for_server(base_url: &str) -> Self {
        Self::new(format!("{}{}", base_url.trim_end_matches('/'), EVENTS_PATH))
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for EventSourceTransport {
    fn open(&self, last_event_id: Option<&str>) -> TransportConnection {
        log::info!("Opening push connection to {}", self.url);

        let (tx, rx) = mpsc::unbounded_channel();
        let mut request = self.http.get(&self.url);
        if let Some(id) = last_event_id {
            request = request.header("Last-Event-ID", id);
        }

        let task = tokio::spawn(async move {
            let mut event_source = match EventSource::new(request) {
                Ok(event_source) => event_source,
                Err(err) => {
                    let _ = tx.send(TransportEvent::Error(err.to_string()));
                    return;
                }
            };
            event_source.set_retry_policy(Box::new(Never));

            while let Some(event) = event_source.next().await {
                let transport_event = match event {
                    Ok(Event::Open) => TransportEvent::Open,
                    Ok(Event::Message(msg)) => TransportEvent::Message(msg),
                    Err(EventSourceError::StreamEnded) => break,
                    Err(err) => {
                        event_source.close();
                        let _ = tx.send(TransportEvent::Error(err.to_string()));
                        return;
                    }
                };

                if tx.send(transport_event).is_err() {
                    event_source.close();
                    return;
                }
            }

            let _ = tx.send(TransportEvent::Closed);
        });

        TransportConnection::new(rx).with_task(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_url_is_joined_with_events_path() {
        let transport = EventSourceTransport::for_server("http://127.0.0.1:3001/");
        assert_eq!(transport.url(), "http://127.0.0.1:3001/api/events");
    }

    #[tokio::test]
    async fn dropping_connection_aborts_reader() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let (alive_tx, alive_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _alive = alive_tx;
            std::future::pending::<()>().await;
        });
        drop(TransportConnection::new(rx).with_task(task));
        assert!(alive_rx.await.is_err());
    }
}
