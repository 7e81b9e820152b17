//! Answer resolution: grading a submission and recording it with first-correct-wins scoring.

use std::time::SystemTime;

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dto::session::{AnswerResponse, SessionView, SubmitAnswerRequest},
    error::ServiceError,
    services::{
        session_service::{ensure_player_id, load_session},
        sse_events::publish_answer,
    },
    state::{
        SharedState,
        session::SessionError,
        transitions::{Mutation, run_conditional_update, with_timeout},
    },
};

/// Canonical form used to compare answers: surrounding whitespace removed, case folded.
pub fn normalize_answer(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Whether `submitted` matches `expected` once both are normalised.
pub fn is_correct(submitted: &str, expected: &str) -> bool {
    normalize_answer(submitted) == normalize_answer(expected)
}

/// Grade and record `request` against the active question of `session_id`.
///
/// The write is a compare-and-set on the session document: a lost race re-reads the session
/// and re-applies the answer, so a late correct answer is recorded without the point once
/// another player holds it.
pub async fn submit_answer(
    state: &SharedState,
    session_id: Uuid,
    request: SubmitAnswerRequest,
) -> Result<AnswerResponse, ServiceError> {
    let player_id = ensure_player_id(&request.player_id)?;
    if request.answer.trim().is_empty() {
        return Err(ServiceError::InvalidInput("answer must not be blank".into()));
    }

    let session = load_session(state, session_id).await?;
    let Some(question_id) = session.current_question_id().map(str::to_owned) else {
        return Err(SessionError::NoActiveQuestion.into());
    };
    if !session.has_player(&player_id) {
        return Err(SessionError::NotAPlayer { player_id }.into());
    }

    // Retries need no store access.
    if let Some(previous) = session.submission_of(&player_id, &question_id) {
        debug!(session_id = %session_id, player_id = %player_id, "answer already recorded");
        return Ok(AnswerResponse {
            correct: previous.correct,
            already_answered: true,
            session: SessionView::from(&session),
        });
    }

    let source = state.question_source().await;
    let question = with_timeout(
        state.config().store.operation_timeout,
        source.get_question(question_id.clone()),
    )
    .await?
    .ok_or_else(|| ServiceError::NotFound(format!("question `{question_id}`")))?;
    let correct = is_correct(&request.answer, &question.expected_answer);

    let update = run_conditional_update(state, session_id, |session| {
        let outcome = session.record_answer(
            &question_id,
            &player_id,
            &request.answer,
            correct,
            SystemTime::now(),
        )?;
        if outcome.already_answered {
            Ok(Mutation::Unchanged(outcome))
        } else {
            Ok(Mutation::Commit(outcome))
        }
    })
    .await?;

    let outcome = update.value;
    if update.committed {
        publish_answer(state, session_id, &player_id, outcome.correct);
        if outcome.scored {
            info!(
                session_id = %session_id,
                player_id = %player_id,
                question_id = %question_id,
                "first correct answer"
            );
        }
    }

    Ok(AnswerResponse {
        correct: outcome.correct,
        already_answered: outcome.already_answered,
        session: SessionView::from(&update.session),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_ignores_case_and_surrounding_whitespace() {
        assert!(is_correct("  paris ", "Paris"));
        assert!(is_correct("NEIL ARMSTRONG", "Neil Armstrong"));
        assert!(is_correct("\tAu\n", "au"));
    }

    #[test]
    fn comparison_is_exact_otherwise() {
        assert!(!is_correct("Pariss", "Paris"));
        assert!(!is_correct("neil  armstrong", "Neil Armstrong"));
        assert!(!is_correct("", "Paris"));
    }
}
