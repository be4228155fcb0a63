use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use chrono::Utc;
use std::convert::Infallible;
use tickboard_model::OutboundMessage;
use tokio_stream::Stream;
use tracing::{debug, warn};

use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};
use crate::infra::sse::ClientGuard;

const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Long-lived push stream.
///
/// Each connection is registered with the client manager for as long as
/// its response stream lives. The first frame is a `connection` greeting;
/// a `Last-Event-ID` header replays whatever the event queue still holds
/// after that id.
pub async fn events_sse_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if !state.file_watcher.is_running() {
        return Err(AppError::unavailable("file watcher is not running"));
    }

    let last_event_id = headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(str::to_string);

    let broadcaster = std::sync::Arc::clone(state.file_watcher.broadcaster());
    let clients = broadcaster.clients().clone();
    let (client, mut receiver) = clients.register(state.client_buffer());
    let client_id = client.id;
    drop(client);

    let backlog = last_event_id
        .as_deref()
        .map(|id| broadcaster.replay_after(id))
        .unwrap_or_default();
    if let Some(id) = &last_event_id {
        debug!(%client_id, last_event_id = %id, replayed = backlog.len(), "client resumed");
    }

    let guard = ClientGuard::new(clients, client_id);
    let stream = async_stream::stream! {
        let _guard = guard;

        let greeting = OutboundMessage::connection(Utc::now().timestamp_millis());
        if let Some(event) = message_to_sse(&greeting) {
            yield Ok::<Event, Infallible>(event);
        }

        for message in backlog {
            if let Some(event) = message_to_sse(&message) {
                yield Ok(event);
            }
        }

        while let Some(message) = receiver.recv().await {
            if let Some(event) = message_to_sse(&message) {
                yield Ok(event);
            }
        }
    };

    Ok(Sse::new(stream))
}

/// One JSON frame; the SSE `id` mirrors `data.eventId` when present.
pub fn message_to_sse(message: &OutboundMessage) -> Option<Event> {
    let data = serde_json::to_string(message)
        .map_err(|err| {
            warn!(message_type = message.kind.as_str(), "failed to serialize push frame: {err}");
            err
        })
        .ok()?;

    let event = Event::default().data(data);
    Some(match message.event_id() {
        Some(id) => event.id(id),
        None => event,
    })
}
