//! In-memory representation of a trivia session and the rules that mutate it.
//!
//! Every method here is synchronous and side-effect free apart from `&mut self`, so the
//! conditional-update runner can replay it against a freshly read document on each attempt.

use std::time::{Duration, SystemTime};

use indexmap::IndexMap;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    dao::models::{ScoreEntity, SessionEntity, SubmissionEntity},
    state::state_machine::{SessionEvent, SessionStatus},
};

/// Rule violations raised by [`Session`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The lobby is closed because the session already started or completed.
    #[error("session is not joinable")]
    NotJoinable,
    /// The lobby reached `max_players`.
    #[error("session is full ({max_players} players)")]
    Full {
        /// Capacity that was reached.
        max_players: usize,
    },
    /// `start` was called twice, or after completion.
    #[error("session already started")]
    AlreadyStarted,
    /// `advance` was called outside of play.
    #[error("session is not in progress")]
    NotInProgress,
    /// No question is currently being played.
    #[error("no active question")]
    NoActiveQuestion,
    /// The submitting player never joined the session.
    #[error("player `{player_id}` is not part of the session")]
    NotAPlayer {
        /// The offending player.
        player_id: String,
    },
    /// The graded question is no longer the active one.
    #[error("question `{question_id}` is no longer active")]
    QuestionClosed {
        /// Question the answer was graded against.
        question_id: String,
    },
    /// The question source returned nothing to play.
    #[error("no questions available")]
    NoQuestionsAvailable,
}

/// One entry of the submission log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Question the answer was given for.
    pub question_id: String,
    /// Player who answered.
    pub player_id: String,
    /// Raw answer text.
    pub answer: String,
    /// Grading result.
    pub correct: bool,
    /// Milliseconds since the question was dealt.
    pub time_ms: u64,
    /// When the answer was recorded.
    pub at: SystemTime,
}

/// Result of [`Session::record_answer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome {
    /// Whether the recorded answer was correct.
    pub correct: bool,
    /// The player had already answered this question; nothing changed.
    pub already_answered: bool,
    /// This answer claimed the point for the question.
    pub scored: bool,
}

/// Result of [`Session::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The pointer moved to the question at this index.
    NextQuestion(usize),
    /// The last question was passed and the session completed.
    Completed,
}

/// Aggregate root of a trivia match.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Stable identifier.
    pub id: Uuid,
    /// Revision of the stored document this value was read from.
    pub version: u64,
    /// Players in join order.
    pub players: Vec<String>,
    /// Capacity bound.
    pub max_players: usize,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Score per player, in join order.
    pub scores: IndexMap<String, u32>,
    /// Question ids dealt at start.
    pub question_queue: Vec<String>,
    /// Pointer into `question_queue`, absent before start.
    pub current_index: Option<usize>,
    /// When the active question was dealt.
    pub question_started_at: Option<SystemTime>,
    /// Players who answered the active question.
    pub answered_player_ids: Vec<String>,
    /// Player credited for the active question.
    pub first_correct_player_id: Option<String>,
    /// Append-only answer log.
    pub submissions: Vec<Submission>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last write timestamp.
    pub updated_at: SystemTime,
    /// Completion timestamp.
    pub ended_at: Option<SystemTime>,
}

impl Session {
    /// Open a new lobby owned by `player_id`.
    pub fn new(player_id: String, max_players: usize, now: SystemTime) -> Self {
        let mut scores = IndexMap::new();
        scores.insert(player_id.clone(), 0);
        Self {
            id: Uuid::new_v4(),
            version: 0,
            players: vec![player_id],
            max_players,
            status: SessionStatus::Waiting,
            scores,
            question_queue: Vec::new(),
            current_index: None,
            question_started_at: None,
            answered_player_ids: Vec::new(),
            first_correct_player_id: None,
            submissions: Vec::new(),
            created_at: now,
            updated_at: now,
            ended_at: None,
        }
    }

    /// Identifier of the question being played, only while in progress.
    pub fn current_question_id(&self) -> Option<&str> {
        if self.status != SessionStatus::InProgress {
            return None;
        }
        self.current_index
            .and_then(|index| self.question_queue.get(index))
            .map(String::as_str)
    }

    /// Whether `player_id` joined the session.
    pub fn has_player(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p == player_id)
    }

    /// Submission of `player_id` for `question_id`, if any.
    pub fn submission_of(&self, player_id: &str, question_id: &str) -> Option<&Submission> {
        self.submissions
            .iter()
            .find(|s| s.player_id == player_id && s.question_id == question_id)
    }

    /// Add a player to the lobby. Returns `false` when the player was already present.
    pub fn join(&mut self, player_id: &str) -> Result<bool, SessionError> {
        self.status
            .apply(SessionEvent::PlayerJoined)
            .map_err(|_| SessionError::NotJoinable)?;

        if self.has_player(player_id) {
            return Ok(false);
        }
        if self.players.len() >= self.max_players {
            return Err(SessionError::Full {
                max_players: self.max_players,
            });
        }

        self.players.push(player_id.to_owned());
        self.scores.insert(player_id.to_owned(), 0);
        Ok(true)
    }

    /// Deal the question queue and activate the first question.
    pub fn start(&mut self, queue: Vec<String>, now: SystemTime) -> Result<(), SessionError> {
        let next = self
            .status
            .apply(SessionEvent::Started)
            .map_err(|_| SessionError::AlreadyStarted)?;
        if queue.is_empty() {
            return Err(SessionError::NoQuestionsAvailable);
        }

        self.status = next;
        self.question_queue = queue;
        self.current_index = Some(0);
        self.question_started_at = Some(now);
        self.answered_player_ids.clear();
        self.first_correct_player_id = None;
        Ok(())
    }

    /// Move to the next question, completing the session after the last one.
    pub fn advance(&mut self, now: SystemTime) -> Result<AdvanceOutcome, SessionError> {
        self.status
            .apply(SessionEvent::QuestionAdvanced)
            .map_err(|_| SessionError::NotInProgress)?;

        let next_index = self.current_index.map_or(0, |index| index + 1);
        self.answered_player_ids.clear();
        self.first_correct_player_id = None;

        if next_index >= self.question_queue.len() {
            self.status = self
                .status
                .apply(SessionEvent::Finished)
                .map_err(|_| SessionError::NotInProgress)?;
            self.question_started_at = None;
            self.ended_at = Some(now);
            return Ok(AdvanceOutcome::Completed);
        }

        self.current_index = Some(next_index);
        self.question_started_at = Some(now);
        Ok(AdvanceOutcome::NextQuestion(next_index))
    }

    /// Record `player_id`'s graded answer for `question_id`.
    ///
    /// The point is awarded only when no one claimed the question yet. A player who already
    /// answered gets their recorded outcome back and the session is left untouched.
    pub fn record_answer(
        &mut self,
        question_id: &str,
        player_id: &str,
        answer: &str,
        correct: bool,
        now: SystemTime,
    ) -> Result<AnswerOutcome, SessionError> {
        self.status
            .apply(SessionEvent::AnswerSubmitted)
            .map_err(|_| SessionError::NoActiveQuestion)?;
        let Some(active) = self.current_question_id() else {
            return Err(SessionError::NoActiveQuestion);
        };
        if active != question_id {
            return Err(SessionError::QuestionClosed {
                question_id: question_id.to_owned(),
            });
        }
        if !self.has_player(player_id) {
            return Err(SessionError::NotAPlayer {
                player_id: player_id.to_owned(),
            });
        }

        if self.answered_player_ids.iter().any(|p| p == player_id) {
            let recorded = self
                .submission_of(player_id, question_id)
                .map_or(correct, |s| s.correct);
            return Ok(AnswerOutcome {
                correct: recorded,
                already_answered: true,
                scored: false,
            });
        }

        let time_ms = self
            .question_started_at
            .and_then(|started| now.duration_since(started).ok())
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64;

        self.answered_player_ids.push(player_id.to_owned());
        self.submissions.push(Submission {
            question_id: question_id.to_owned(),
            player_id: player_id.to_owned(),
            answer: answer.to_owned(),
            correct,
            time_ms,
            at: now,
        });

        let scored = correct && self.first_correct_player_id.is_none();
        if scored {
            self.first_correct_player_id = Some(player_id.to_owned());
            *self.scores.entry(player_id.to_owned()).or_insert(0) += 1;
        }

        Ok(AnswerOutcome {
            correct,
            already_answered: false,
            scored,
        })
    }
}

impl From<SubmissionEntity> for Submission {
    fn from(value: SubmissionEntity) -> Self {
        Self {
            question_id: value.question_id,
            player_id: value.player_id,
            answer: value.answer,
            correct: value.correct,
            time_ms: value.time_ms,
            at: value.at,
        }
    }
}

impl From<Submission> for SubmissionEntity {
    fn from(value: Submission) -> Self {
        Self {
            question_id: value.question_id,
            player_id: value.player_id,
            answer: value.answer,
            correct: value.correct,
            time_ms: value.time_ms,
            at: value.at,
        }
    }
}

impl From<SessionEntity> for Session {
    fn from(value: SessionEntity) -> Self {
        let mut scores: IndexMap<String, u32> = value
            .scores
            .into_iter()
            .map(|entry| (entry.player_id, entry.score))
            .collect();
        // Every player owns a score entry, even if the document predates it.
        for player in &value.players {
            scores.entry(player.clone()).or_insert(0);
        }

        Self {
            id: value.id,
            version: value.version,
            players: value.players,
            max_players: value.max_players,
            status: value.status.into(),
            scores,
            question_queue: value.question_queue,
            current_index: value.current_index,
            question_started_at: value.question_started_at,
            answered_player_ids: value.answered_player_ids,
            first_correct_player_id: value.first_correct_player_id,
            submissions: value.submissions.into_iter().map(Into::into).collect(),
            created_at: value.created_at,
            updated_at: value.updated_at,
            ended_at: value.ended_at,
        }
    }
}

impl From<Session> for SessionEntity {
    fn from(value: Session) -> Self {
        Self {
            id: value.id,
            version: value.version,
            players: value.players,
            max_players: value.max_players,
            status: value.status.into(),
            scores: value
                .scores
                .into_iter()
                .map(|(player_id, score)| ScoreEntity { player_id, score })
                .collect(),
            question_queue: value.question_queue,
            current_index: value.current_index,
            question_started_at: value.question_started_at,
            answered_player_ids: value.answered_player_ids,
            first_correct_player_id: value.first_correct_player_id,
            submissions: value.submissions.into_iter().map(Into::into).collect(),
            created_at: value.created_at,
            updated_at: value.updated_at,
            ended_at: value.ended_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(len: usize) -> Vec<String> {
        (0..len).map(|i| format!("q{i}")).collect()
    }

    fn started(players: &[&str]) -> Session {
        let now = SystemTime::now();
        let mut session = Session::new(players[0].to_owned(), 6, now);
        for player in &players[1..] {
            session.join(player).unwrap();
        }
        session.start(queue(3), now).unwrap();
        session
    }

    #[test]
    fn new_session_has_owner_with_zero_score() {
        let session = Session::new("p1".into(), 6, SystemTime::now());
        assert_eq!(session.players, vec!["p1"]);
        assert_eq!(session.scores.get("p1"), Some(&0));
        assert_eq!(session.status, SessionStatus::Waiting);
        assert!(session.current_question_id().is_none());
    }

    #[test]
    fn join_is_idempotent() {
        let mut session = Session::new("p1".into(), 6, SystemTime::now());
        assert!(session.join("p2").unwrap());
        let before = session.clone();
        assert!(!session.join("p2").unwrap());
        assert_eq!(session, before);
    }

    #[test]
    fn join_respects_capacity() {
        let mut session = Session::new("p1".into(), 2, SystemTime::now());
        session.join("p2").unwrap();
        assert_eq!(
            session.join("p3").unwrap_err(),
            SessionError::Full { max_players: 2 }
        );
        // Re-join of a member still succeeds on a full lobby.
        assert!(!session.join("p2").unwrap());
        assert_eq!(session.players.len(), 2);
    }

    #[test]
    fn join_after_start_is_rejected() {
        let mut session = started(&["p1"]);
        assert_eq!(session.join("p2").unwrap_err(), SessionError::NotJoinable);
    }

    #[test]
    fn start_deals_queue_once() {
        let mut session = started(&["p1", "p2"]);
        assert_eq!(session.current_index, Some(0));
        assert_eq!(session.current_question_id(), Some("q0"));
        assert_eq!(
            session.start(queue(3), SystemTime::now()).unwrap_err(),
            SessionError::AlreadyStarted
        );
    }

    #[test]
    fn start_with_empty_queue_fails() {
        let mut session = Session::new("p1".into(), 6, SystemTime::now());
        assert_eq!(
            session.start(Vec::new(), SystemTime::now()).unwrap_err(),
            SessionError::NoQuestionsAvailable
        );
        assert_eq!(session.status, SessionStatus::Waiting);
    }

    #[test]
    fn first_correct_answer_wins_the_point() {
        let mut session = started(&["p1", "p2"]);
        let now = SystemTime::now();

        let first = session.record_answer("q0", "p1", "Paris", true, now).unwrap();
        let second = session.record_answer("q0", "p2", "paris", true, now).unwrap();

        assert!(first.scored);
        assert!(second.correct && !second.scored);
        assert_eq!(session.first_correct_player_id.as_deref(), Some("p1"));
        assert_eq!(session.scores["p1"], 1);
        assert_eq!(session.scores["p2"], 0);
        assert_eq!(session.answered_player_ids, vec!["p1", "p2"]);
    }

    #[test]
    fn second_submission_returns_recorded_outcome() {
        let mut session = started(&["p1"]);
        let now = SystemTime::now();
        session.record_answer("q0", "p1", "wrong", false, now).unwrap();
        let before = session.clone();

        let retry = session.record_answer("q0", "p1", "right", true, now).unwrap();
        assert_eq!(
            retry,
            AnswerOutcome {
                correct: false,
                already_answered: true,
                scored: false,
            }
        );
        assert_eq!(session, before);
    }

    #[test]
    fn stale_question_is_rejected() {
        let mut session = started(&["p1"]);
        session.advance(SystemTime::now()).unwrap();
        assert_eq!(
            session
                .record_answer("q0", "p1", "x", true, SystemTime::now())
                .unwrap_err(),
            SessionError::QuestionClosed {
                question_id: "q0".into()
            }
        );
    }

    #[test]
    fn outsiders_cannot_answer() {
        let mut session = started(&["p1"]);
        assert!(matches!(
            session.record_answer("q0", "p9", "x", true, SystemTime::now()),
            Err(SessionError::NotAPlayer { .. })
        ));
    }

    #[test]
    fn advance_resets_question_state_and_completes_at_end() {
        let mut session = started(&["p1"]);
        session
            .record_answer("q0", "p1", "x", true, SystemTime::now())
            .unwrap();

        assert_eq!(
            session.advance(SystemTime::now()).unwrap(),
            AdvanceOutcome::NextQuestion(1)
        );
        assert!(session.answered_player_ids.is_empty());
        assert!(session.first_correct_player_id.is_none());

        assert_eq!(
            session.advance(SystemTime::now()).unwrap(),
            AdvanceOutcome::NextQuestion(2)
        );
        assert_eq!(
            session.advance(SystemTime::now()).unwrap(),
            AdvanceOutcome::Completed
        );
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.current_index, Some(2));
        assert!(session.current_question_id().is_none());
        assert!(session.ended_at.is_some());

        assert_eq!(
            session.advance(SystemTime::now()).unwrap_err(),
            SessionError::NotInProgress
        );
    }

    #[test]
    fn answering_in_lobby_has_no_active_question() {
        let mut session = Session::new("p1".into(), 6, SystemTime::now());
        assert_eq!(
            session
                .record_answer("q0", "p1", "x", true, SystemTime::now())
                .unwrap_err(),
            SessionError::NoActiveQuestion
        );
    }

    #[test]
    fn entity_conversion_fills_missing_scores() {
        let session = started(&["p1", "p2"]);
        let mut entity: SessionEntity = session.clone().into();
        entity.scores.retain(|s| s.player_id == "p1");

        let restored = Session::from(entity);
        assert_eq!(restored.scores.len(), 2);
        assert_eq!(restored.scores["p2"], 0);
    }
}
