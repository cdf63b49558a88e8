//! Server-Sent Events support

use crate::presenter::UiEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Convert broadcast stream to SSE stream
pub fn sse_stream(
    init_event: UiEvent,
    broadcast_rx: tokio::sync::broadcast::Receiver<UiEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Create stream that starts with init event then broadcasts
    let init = futures::stream::once(async move { Ok(ui_event_to_axum(init_event)) });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(event) => Some(Ok(ui_event_to_axum(event))),
        Err(_) => None, // Skip lagged messages
    });

    let combined = init.chain(broadcasts);

    Sse::new(combined).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn ui_event_to_axum(event: UiEvent) -> Event {
    let (event_type, data) = match event {
        UiEvent::Init {
            session_id,
            messages,
        } => (
            "init",
            json!({
                "type": "init",
                "session_id": session_id,
                "messages": messages
            }),
        ),
        UiEvent::MessageStarted {
            message_id,
            placeholder,
        } => (
            "message_started",
            json!({
                "type": "message_started",
                "message_id": message_id,
                "placeholder": placeholder
            }),
        ),
        UiEvent::Fragment { message_id, delta } => (
            "fragment",
            json!({
                "type": "fragment",
                "message_id": message_id,
                "delta": delta
            }),
        ),
        UiEvent::MessageCompleted { message } => (
            "message_completed",
            json!({
                "type": "message_completed",
                "message": message
            }),
        ),
        UiEvent::TurnFailed {
            message_id,
            kind,
            message,
        } => (
            "turn_failed",
            json!({
                "type": "turn_failed",
                "message_id": message_id,
                "kind": kind,
                "message": message
            }),
        ),
    };

    Event::default().event(event_type).data(data.to_string())
}
