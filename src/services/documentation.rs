use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Frenzy Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::create_session,
        crate::routes::session::list_open_sessions,
        crate::routes::session::get_session,
        crate::routes::session::join_session,
        crate::routes::session::start_session,
        crate::routes::session::submit_answer,
        crate::routes::session::advance_session,
        crate::routes::history::match_history,
        crate::routes::history::player_history,
        crate::routes::history::player_stats,
        crate::routes::sse::public_stream,
        crate::routes::sse::session_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::JoinSessionRequest,
            crate::dto::session::SubmitAnswerRequest,
            crate::dto::session::SessionView,
            crate::dto::session::SubmissionView,
            crate::dto::session::AnswerResponse,
            crate::dto::session::OpenSessionSummary,
            crate::dto::history::HistoryAnswerView,
            crate::dto::history::HistoryRecordView,
            crate::dto::history::BreakdownEntry,
            crate::dto::history::MatchHistoryResponse,
            crate::dto::history::TrendPoint,
            crate::dto::history::PlayerStatsResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::AnswerEvent,
            crate::error::ErrorBody,
            crate::state::state_machine::SessionStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Session lifecycle and answers"),
        (name = "history", description = "Match recaps and player statistics"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_session_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/sessions/{id}/answer"));
        assert!(doc.paths.paths.contains_key("/players/{player_id}/stats"));
    }
}
