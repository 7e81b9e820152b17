use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        format_system_time,
        validation::{validate_answer, validate_player_id},
    },
    state::{
        session::{Session, Submission},
        state_machine::SessionStatus,
    },
};

/// Payload opening a new lobby.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateSessionRequest {
    /// Player creating (and joining) the session.
    #[validate(custom(function = "validate_player_id"))]
    pub player_id: String,
    /// Optional capacity override; the configured default applies otherwise.
    #[validate(range(min = 1, max = 32))]
    #[serde(default)]
    pub max_players: Option<usize>,
}

/// Payload joining an existing lobby.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinSessionRequest {
    /// Player joining the session.
    #[validate(custom(function = "validate_player_id"))]
    pub player_id: String,
}

/// Payload answering the active question.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitAnswerRequest {
    /// Player answering.
    #[validate(custom(function = "validate_player_id"))]
    pub player_id: String,
    /// Free-text answer; compared after trimming and case folding.
    #[validate(custom(function = "validate_answer"))]
    pub answer: String,
}

/// Entry of the submission log.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmissionView {
    /// Question answered.
    pub question_id: String,
    /// Player who answered.
    pub player_id: String,
    /// Raw answer text.
    pub answer: String,
    /// Grading result.
    pub correct: bool,
    /// Milliseconds since the question was dealt.
    pub time_ms: u64,
    /// RFC 3339 timestamp of the submission.
    pub at: String,
}

impl From<&Submission> for SubmissionView {
    fn from(value: &Submission) -> Self {
        Self {
            question_id: value.question_id.clone(),
            player_id: value.player_id.clone(),
            answer: value.answer.clone(),
            correct: value.correct,
            time_ms: value.time_ms,
            at: format_system_time(value.at),
        }
    }
}

/// Snapshot of a session as returned to callers and published to subscribers.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionView {
    /// Session identifier.
    pub id: Uuid,
    /// Document revision; higher means newer.
    pub version: u64,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Players in join order.
    pub players: Vec<String>,
    /// Capacity bound.
    pub max_players: usize,
    /// Score per player, in join order.
    #[schema(value_type = Object)]
    pub scores: IndexMap<String, u32>,
    /// Question ids dealt at start.
    pub question_queue: Vec<String>,
    /// Pointer into the queue.
    pub current_index: Option<usize>,
    /// Active question, only while in progress.
    pub current_question_id: Option<String>,
    /// When the active question was dealt.
    pub question_started_at: Option<String>,
    /// Players who answered the active question.
    pub answered_player_ids: Vec<String>,
    /// Player credited for the active question.
    pub first_correct_player_id: Option<String>,
    /// Full answer log.
    pub submissions: Vec<SubmissionView>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last write timestamp.
    pub updated_at: String,
    /// Completion timestamp.
    pub ended_at: Option<String>,
}

impl From<&Session> for SessionView {
    fn from(value: &Session) -> Self {
        Self {
            id: value.id,
            version: value.version,
            status: value.status,
            players: value.players.clone(),
            max_players: value.max_players,
            scores: value.scores.clone(),
            question_queue: value.question_queue.clone(),
            current_index: value.current_index,
            current_question_id: value.current_question_id().map(str::to_owned),
            question_started_at: value.question_started_at.map(format_system_time),
            answered_player_ids: value.answered_player_ids.clone(),
            first_correct_player_id: value.first_correct_player_id.clone(),
            submissions: value.submissions.iter().map(SubmissionView::from).collect(),
            created_at: format_system_time(value.created_at),
            updated_at: format_system_time(value.updated_at),
            ended_at: value.ended_at.map(format_system_time),
        }
    }
}

impl From<Session> for SessionView {
    fn from(value: Session) -> Self {
        Self::from(&value)
    }
}

/// Result of an answer submission.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnswerResponse {
    /// Whether the recorded answer is correct.
    pub correct: bool,
    /// The player had already answered this question; nothing changed.
    pub already_answered: bool,
    /// Session after the submission. Compare `first_correct_player_id` to learn who scored.
    pub session: SessionView,
}

/// Lobby listed by `GET /sessions/open`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OpenSessionSummary {
    /// Session identifier.
    pub id: Uuid,
    /// Players already in the lobby.
    pub players: Vec<String>,
    /// Capacity bound.
    pub max_players: usize,
    /// Creation timestamp.
    pub created_at: String,
}

impl From<Session> for OpenSessionSummary {
    fn from(value: Session) -> Self {
        Self {
            id: value.id,
            players: value.players,
            max_players: value.max_players,
            created_at: format_system_time(value.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    #[test]
    fn create_request_bounds_capacity() {
        let ok = CreateSessionRequest {
            player_id: "p1".into(),
            max_players: Some(6),
        };
        assert!(ok.validate().is_ok());

        let too_many = CreateSessionRequest {
            player_id: "p1".into(),
            max_players: Some(33),
        };
        assert!(too_many.validate().is_err());

        let blank = CreateSessionRequest {
            player_id: " ".into(),
            max_players: None,
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn blank_answer_is_rejected() {
        let request = SubmitAnswerRequest {
            player_id: "p1".into(),
            answer: "   ".into(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn lobby_view_omits_absent_fields() {
        let session = Session::new("p1".into(), 6, SystemTime::now());
        let value = serde_json::to_value(SessionView::from(&session)).unwrap();
        assert_eq!(value["status"], "waiting");
        assert_eq!(value["scores"]["p1"], 0);
        assert!(value.get("current_question_id").is_none());
        assert!(value.get("ended_at").is_none());
    }
}
