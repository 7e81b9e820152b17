use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{broadcast::{self, error::RecvError}, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;
use uuid::Uuid;

use crate::{
    dto::sse::{Handshake, ServerEvent},
    error::ServiceError,
    services::{session_service::load_session, sse_events::broadcast_system_status},
    state::SharedState,
};

const EVENT_HANDSHAKE: &str = "handshake";

/// Which events a stream forwards.
#[derive(Clone, Copy, Debug)]
pub enum StreamKind {
    /// Every event.
    Public,
    /// Events about one session, plus untagged system events.
    Session(Uuid),
}

impl StreamKind {
    fn accepts(&self, event: &ServerEvent) -> bool {
        match self {
            StreamKind::Public => true,
            StreamKind::Session(id) => event.concerns(*id),
        }
    }
}

/// Subscribe to the global stream.
pub fn subscribe_public(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.sse().subscribe()
}

/// Subscribe to the events of an existing session.
pub async fn subscribe_session(
    state: &SharedState,
    session_id: Uuid,
) -> Result<broadcast::Receiver<ServerEvent>, ServiceError> {
    // Subscribe first so no commit between the check and the subscription is missed.
    let receiver = state.sse().subscribe();
    load_session(state, session_id).await?;
    Ok(receiver)
}

/// Initial event sent on every new stream.
pub fn handshake(state: &SharedState, kind: StreamKind) -> Option<ServerEvent> {
    let payload = match kind {
        StreamKind::Public => Handshake {
            stream: "public".into(),
            session_id: None,
            degraded: state.is_degraded(),
        },
        StreamKind::Session(id) => Handshake {
            stream: "session".into(),
            session_id: Some(id),
            degraded: state.is_degraded(),
        },
    };
    ServerEvent::json(Some(EVENT_HANDSHAKE.to_string()), &payload).ok()
}

/// Relay degraded-mode flips to every SSE stream until the state is dropped.
pub fn spawn_degraded_broadcaster(state: SharedState) -> tokio::task::JoinHandle<()> {
    let mut watcher = state.degraded_watcher();
    tokio::spawn(async move {
        while watcher.changed().await.is_ok() {
            let degraded = *watcher.borrow_and_update();
            broadcast_system_status(&state, degraded);
        }
    })
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Convert a broadcast receiver into an SSE response, forwarding the events `kind` accepts
/// until the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    kind: StreamKind,
    first: Option<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(first) = first {
            if tx.send(Ok(to_event(first))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if !kind.accepts(&payload) {
                                continue;
                            }
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {
                            // Skip lagged messages but keep the stream alive.
                            continue;
                        }
                    }
                }
            }
        }

        info!(stream = ?kind, "SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
