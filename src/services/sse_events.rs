use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{
        session::SessionView,
        sse::{AnswerEvent, ServerEvent, SessionUpdatedEvent, SystemStatus},
    },
    state::{PublishError, SharedState, session::Session},
};

const EVENT_SESSION_UPDATED: &str = "session.updated";
const EVENT_ANSWER: &str = "answer";
const EVENT_SYSTEM_STATUS: &str = "system_status";

/// Publish the refreshed snapshot of a committed session.
pub fn publish_session(state: &SharedState, session: &Session) {
    let payload = SessionUpdatedEvent(SessionView::from(session));
    send_session_event(state, session.id, EVENT_SESSION_UPDATED, &payload);
}

/// Publish the outcome of a committed answer.
pub fn publish_answer(state: &SharedState, session_id: Uuid, player_id: &str, correct: bool) {
    let payload = AnswerEvent {
        session_id,
        player_id: player_id.to_owned(),
        correct,
    };
    send_session_event(state, session_id, EVENT_ANSWER, &payload);
}

/// Broadcast the degraded flag to every stream.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    match ServerEvent::json(Some(EVENT_SYSTEM_STATUS.to_string()), &SystemStatus { degraded }) {
        Ok(event) => state.sse().broadcast(event),
        Err(err) => warn!(error = %err, "failed to serialize system status payload"),
    }
}

/// Hand an event to the publisher. Failures are logged and never reach the caller.
fn send_session_event(
    state: &SharedState,
    session_id: Uuid,
    event: &str,
    payload: &impl Serialize,
) {
    let outcome = ServerEvent::json(Some(event.to_string()), payload)
        .map_err(PublishError::from)
        .and_then(|message| state.publisher().publish(message.for_session(session_id)));
    if let Err(err) = outcome {
        warn!(
            session_id = %session_id,
            event,
            error = %err,
            "failed to publish session event"
        );
    }
}
