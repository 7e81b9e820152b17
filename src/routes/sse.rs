use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{AppError, ErrorBody},
    services::sse_service::{self, StreamKind},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/public",
    tag = "sse",
    responses((status = 200, description = "Every session event", content_type = "text/event-stream", body = String))
)]
/// Stream every session change and system status update.
pub async fn public_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = sse_service::subscribe_public(&state);
    info!("New public SSE connection");
    let handshake = sse_service::handshake(&state, StreamKind::Public);
    sse_service::to_sse_stream(receiver, StreamKind::Public, handshake)
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/events",
    tag = "sse",
    params(("id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Events of one session", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown session", body = ErrorBody)
    )
)]
/// Stream the changes of a single session.
pub async fn session_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let receiver = sse_service::subscribe_session(&state, id).await?;
    info!(session_id = %id, "New session SSE connection");
    let kind = StreamKind::Session(id);
    let handshake = sse_service::handshake(&state, kind);
    Ok(sse_service::to_sse_stream(receiver, kind, handshake))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/public", get(public_stream))
        .route("/sessions/{id}/events", get(session_stream))
}
