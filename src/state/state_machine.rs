use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::dao::models::SessionStatusEntity;

/// Lifecycle phases of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Players may join; no question has been dealt yet.
    Waiting,
    /// Questions are being played one at a time.
    InProgress,
    /// Every question has been played; the session is frozen.
    Completed,
}

/// Events that can be applied to a session's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new player entered the lobby.
    PlayerJoined,
    /// The question queue was dealt.
    Started,
    /// A player recorded an answer for the active question.
    AnswerSubmitted,
    /// The pointer moved to the next question.
    QuestionAdvanced,
    /// The last question was passed.
    Finished,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// The status the session was in when the event was received.
    pub from: SessionStatus,
    /// The event that cannot be applied from this status.
    pub event: SessionEvent,
}

impl SessionStatus {
    /// Compute the status reached by applying `event`, if the transition is valid.
    pub fn apply(self, event: SessionEvent) -> Result<SessionStatus, InvalidTransition> {
        let next = match (self, event) {
            (SessionStatus::Waiting, SessionEvent::PlayerJoined) => SessionStatus::Waiting,
            (SessionStatus::Waiting, SessionEvent::Started) => SessionStatus::InProgress,
            (SessionStatus::InProgress, SessionEvent::AnswerSubmitted) => SessionStatus::InProgress,
            (SessionStatus::InProgress, SessionEvent::QuestionAdvanced) => {
                SessionStatus::InProgress
            }
            (SessionStatus::InProgress, SessionEvent::Finished) => SessionStatus::Completed,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

impl From<SessionStatusEntity> for SessionStatus {
    fn from(value: SessionStatusEntity) -> Self {
        match value {
            SessionStatusEntity::Waiting => SessionStatus::Waiting,
            SessionStatusEntity::InProgress => SessionStatus::InProgress,
            SessionStatusEntity::Completed => SessionStatus::Completed,
        }
    }
}

impl From<SessionStatus> for SessionStatusEntity {
    fn from(value: SessionStatus) -> Self {
        match value {
            SessionStatus::Waiting => SessionStatusEntity::Waiting,
            SessionStatus::InProgress => SessionStatusEntity::InProgress,
            SessionStatus::Completed => SessionStatusEntity::Completed,
        }
    }
}
