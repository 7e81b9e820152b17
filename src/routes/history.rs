use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::history::{HistoryRecordView, MatchHistoryResponse, PlayerStatsResponse},
    error::{AppError, ErrorBody},
    services::history_service,
    state::SharedState,
};

/// Match recaps and per-player history.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sessions/{id}/history", get(match_history))
        .route("/players/{player_id}/history", get(player_history))
        .route("/players/{player_id}/stats", get(player_stats))
}

/// Session snapshot with its history records and answer breakdown.
#[utoipa::path(
    get,
    path = "/sessions/{id}/history",
    tag = "history",
    params(("id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Match recap", body = MatchHistoryResponse),
        (status = 404, description = "Unknown session", body = ErrorBody)
    )
)]
pub async fn match_history(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchHistoryResponse>, AppError> {
    Ok(Json(history_service::get_match_history(&state, id).await?))
}

/// Most recent history records of a player, newest first.
#[utoipa::path(
    get,
    path = "/players/{player_id}/history",
    tag = "history",
    params(("player_id" = String, Path, description = "Player identifier")),
    responses((status = 200, description = "History records", body = [HistoryRecordView]))
)]
pub async fn player_history(
    State(state): State<SharedState>,
    Path(player_id): Path<String>,
) -> Result<Json<Vec<HistoryRecordView>>, AppError> {
    Ok(Json(history_service::get_history(&state, &player_id).await?))
}

/// Win count, averages and score trend of a player.
#[utoipa::path(
    get,
    path = "/players/{player_id}/stats",
    tag = "history",
    params(("player_id" = String, Path, description = "Player identifier")),
    responses((status = 200, description = "Player statistics", body = PlayerStatsResponse))
)]
pub async fn player_stats(
    State(state): State<SharedState>,
    Path(player_id): Path<String>,
) -> Result<Json<PlayerStatsResponse>, AppError> {
    Ok(Json(history_service::get_player_stats(&state, &player_id).await?))
}
