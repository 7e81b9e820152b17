use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::session::{
        AnswerResponse, CreateSessionRequest, JoinSessionRequest, OpenSessionSummary,
        SessionView, SubmitAnswerRequest,
    },
    error::{AppError, ErrorBody},
    services::{answer_service, session_service},
    state::SharedState,
};

/// Session lifecycle endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sessions", post(create_session))
        .route("/sessions/open", get(list_open_sessions))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/join", post(join_session))
        .route("/sessions/{id}/start", post(start_session))
        .route("/sessions/{id}/answer", post(submit_answer))
        .route("/sessions/{id}/advance", post(advance_session))
}

/// Open a new lobby with the caller as its first player.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = SessionView),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 503, description = "Storage unavailable", body = ErrorBody)
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let session = session_service::create_session(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// List waiting lobbies, newest first.
#[utoipa::path(
    get,
    path = "/sessions/open",
    tag = "sessions",
    responses((status = 200, description = "Open lobbies", body = [OpenSessionSummary]))
)]
pub async fn list_open_sessions(
    State(state): State<SharedState>,
) -> Result<Json<Vec<OpenSessionSummary>>, AppError> {
    Ok(Json(session_service::list_open_sessions(&state).await?))
}

/// Fetch the latest snapshot of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session snapshot", body = SessionView),
        (status = 404, description = "Unknown session", body = ErrorBody)
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::get_session(&state, id).await?))
}

/// Join a waiting lobby. Joining twice returns the unchanged session.
#[utoipa::path(
    post,
    path = "/sessions/{id}/join",
    tag = "sessions",
    params(("id" = String, Path, description = "Session identifier")),
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Player in the session", body = SessionView),
        (status = 404, description = "Unknown session", body = ErrorBody),
        (status = 409, description = "Session started or full", body = ErrorBody)
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<JoinSessionRequest>>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::join_session(&state, id, payload).await?))
}

/// Deal the questions and activate the first one.
#[utoipa::path(
    post,
    path = "/sessions/{id}/start",
    tag = "sessions",
    params(("id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session started", body = SessionView),
        (status = 404, description = "Unknown session or no questions", body = ErrorBody),
        (status = 409, description = "Session already started", body = ErrorBody)
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::start_session(&state, id).await?))
}

/// Answer the active question. Only the first correct answer scores.
#[utoipa::path(
    post,
    path = "/sessions/{id}/answer",
    tag = "sessions",
    params(("id" = String, Path, description = "Session identifier")),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer recorded", body = AnswerResponse),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 409, description = "No active question or not a player", body = ErrorBody)
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SubmitAnswerRequest>>,
) -> Result<Json<AnswerResponse>, AppError> {
    Ok(Json(answer_service::submit_answer(&state, id, payload).await?))
}

/// Move to the next question, completing the session after the last one.
#[utoipa::path(
    post,
    path = "/sessions/{id}/advance",
    tag = "sessions",
    params(("id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session advanced", body = SessionView),
        (status = 409, description = "Session not in progress", body = ErrorBody)
    )
)]
pub async fn advance_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::advance_session(&state, id).await?))
}
