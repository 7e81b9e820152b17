use std::time::SystemTime;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::SessionStatusEntity,
    dto::session::{
        CreateSessionRequest, JoinSessionRequest, OpenSessionSummary, SessionView,
    },
    error::ServiceError,
    services::{history_service, sse_events::publish_session},
    state::{
        SharedState,
        session::{AdvanceOutcome, Session},
        transitions::{Mutation, run_conditional_update, with_timeout},
    },
};

/// Number of lobbies returned by [`list_open_sessions`].
pub const OPEN_SESSIONS_LIMIT: usize = 50;

/// Reject blank identifiers before any store access.
pub(crate) fn ensure_player_id(player_id: &str) -> Result<String, ServiceError> {
    let trimmed = player_id.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidInput("player_id must not be blank".into()));
    }
    Ok(trimmed.to_owned())
}

/// Open a new lobby with the caller as its first player.
pub async fn create_session(
    state: &SharedState,
    request: CreateSessionRequest,
) -> Result<SessionView, ServiceError> {
    let player_id = ensure_player_id(&request.player_id)?;
    let max_players = request.max_players.unwrap_or(state.config().max_players);
    if max_players == 0 {
        return Err(ServiceError::InvalidInput("max_players must be positive".into()));
    }

    let store = state.require_session_store().await?;
    let session = Session::new(player_id, max_players, SystemTime::now());
    with_timeout(
        state.config().store.operation_timeout,
        store.create_session(session.clone().into()),
    )
    .await?;

    info!(session_id = %session.id, player_id = %session.players[0], "session created");
    publish_session(state, &session);
    Ok(SessionView::from(&session))
}

/// Add a player to a waiting session. Joining twice is a no-op.
pub async fn join_session(
    state: &SharedState,
    session_id: Uuid,
    request: JoinSessionRequest,
) -> Result<SessionView, ServiceError> {
    let player_id = ensure_player_id(&request.player_id)?;

    let update = run_conditional_update(state, session_id, |session| {
        if session.join(&player_id)? {
            Ok(Mutation::Commit(()))
        } else {
            Ok(Mutation::Unchanged(()))
        }
    })
    .await?;

    if update.committed {
        info!(session_id = %session_id, player_id = %player_id, "player joined");
    }
    Ok(SessionView::from(&update.session))
}

/// Deal the question queue and activate the first question.
pub async fn start_session(
    state: &SharedState,
    session_id: Uuid,
) -> Result<SessionView, ServiceError> {
    let config = state.config();
    let store = state.require_session_store().await?;

    // Fail fast without drawing questions for a session that cannot start.
    let current = with_timeout(
        config.store.operation_timeout,
        store.find_session(session_id),
    )
    .await?
    .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}`")))?;
    if current.status != SessionStatusEntity::Waiting {
        return Err(ServiceError::InvalidState("session already started".into()));
    }

    let source = state.question_source().await;
    let queue = with_timeout(
        config.store.operation_timeout,
        source.sample_questions(config.questions_per_session),
    )
    .await?;

    let update = run_conditional_update(state, session_id, |session| {
        session.start(queue.clone(), SystemTime::now())?;
        Ok(Mutation::Commit(()))
    })
    .await?;

    info!(
        session_id = %session_id,
        questions = update.session.question_queue.len(),
        "session started"
    );
    Ok(SessionView::from(&update.session))
}

/// Move to the next question, completing the session after the last one.
pub async fn advance_session(
    state: &SharedState,
    session_id: Uuid,
) -> Result<SessionView, ServiceError> {
    let update = run_conditional_update(state, session_id, |session| {
        let outcome = session.advance(SystemTime::now())?;
        Ok(Mutation::Commit(outcome))
    })
    .await?;

    match update.value {
        AdvanceOutcome::NextQuestion(index) => {
            info!(session_id = %session_id, index, "advanced to next question");
        }
        AdvanceOutcome::Completed => {
            info!(session_id = %session_id, "session completed");
            // The completion is committed; a failed history write is recovered on read.
            if let Err(err) = history_service::record_completion(state, &update.session).await {
                warn!(
                    session_id = %session_id,
                    error = %err,
                    "failed to persist history records"
                );
            }
        }
    }

    Ok(SessionView::from(&update.session))
}

/// Latest snapshot of a session.
pub async fn get_session(
    state: &SharedState,
    session_id: Uuid,
) -> Result<SessionView, ServiceError> {
    load_session(state, session_id)
        .await
        .map(|session| SessionView::from(&session))
}

/// Waiting lobbies, newest first.
pub async fn list_open_sessions(
    state: &SharedState,
) -> Result<Vec<OpenSessionSummary>, ServiceError> {
    let store = state.require_session_store().await?;
    let sessions = with_timeout(
        state.config().store.operation_timeout,
        store.list_sessions(SessionStatusEntity::Waiting, OPEN_SESSIONS_LIMIT),
    )
    .await?;

    Ok(sessions
        .into_iter()
        .map(|entity| OpenSessionSummary::from(Session::from(entity)))
        .collect())
}

pub(crate) async fn load_session(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Session, ServiceError> {
    let store = state.require_session_store().await?;
    with_timeout(
        state.config().store.operation_timeout,
        store.find_session(session_id),
    )
    .await?
    .map(Session::from)
    .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}`")))
}
