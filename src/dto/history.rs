use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{HistoryAnswerEntity, HistoryEntity},
    dto::{format_system_time, session::SessionView},
};

/// Answer summarised in a history record.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HistoryAnswerView {
    /// Question answered.
    pub question_id: String,
    /// Whether it was correct.
    pub correct: bool,
    /// Response time in milliseconds.
    pub time_ms: u64,
    /// Raw answer text.
    pub answer: String,
}

impl From<HistoryAnswerEntity> for HistoryAnswerView {
    fn from(value: HistoryAnswerEntity) -> Self {
        Self {
            question_id: value.question_id,
            correct: value.correct,
            time_ms: value.time_ms,
            answer: value.answer,
        }
    }
}

/// Per-player summary of a completed session.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HistoryRecordView {
    /// Session summarised.
    pub session_id: Uuid,
    /// Player summarised.
    pub player_id: String,
    /// Answers in submission order.
    pub answers: Vec<HistoryAnswerView>,
    /// Score at completion.
    pub final_score: u32,
    /// Session duration in milliseconds.
    pub duration_ms: u64,
    /// Correct answers over answers given.
    pub accuracy: f64,
    /// Dense rank by final score (1 = best).
    pub rank: u32,
    /// Completion timestamp.
    pub ended_at: String,
}

impl From<HistoryEntity> for HistoryRecordView {
    fn from(value: HistoryEntity) -> Self {
        Self {
            session_id: value.session_id,
            player_id: value.player_id,
            answers: value.answers.into_iter().map(Into::into).collect(),
            final_score: value.final_score,
            duration_ms: value.duration_ms,
            accuracy: value.accuracy,
            rank: value.rank,
            ended_at: format_system_time(value.ended_at),
        }
    }
}

/// One submission enriched with its question prompt.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BreakdownEntry {
    /// Question answered.
    pub question_id: String,
    /// Question text, `Unknown` when the question bank no longer has it.
    pub prompt: String,
    /// Player who answered.
    pub player_id: String,
    /// Raw answer text.
    pub answer: String,
    /// Grading result.
    pub correct: bool,
    /// Response time in milliseconds.
    pub time_ms: u64,
}

/// Full recap of a session.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MatchHistoryResponse {
    /// Latest session snapshot.
    pub session: SessionView,
    /// History records, best rank first. Empty until the session completes.
    pub records: Vec<HistoryRecordView>,
    /// Submission log with prompts.
    pub breakdown: Vec<BreakdownEntry>,
}

/// Point of a player's score trend.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TrendPoint {
    /// Completion timestamp of the match.
    pub ended_at: String,
    /// Final score of the match.
    pub score: u32,
    /// Accuracy in the match.
    pub accuracy: f64,
}

/// Aggregated statistics of a player's recent matches.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerStatsResponse {
    /// Player described.
    pub player_id: String,
    /// Matches taken into account.
    pub total_matches: usize,
    /// Matches finished at rank 1.
    pub wins: usize,
    /// Mean final score.
    pub average_score: f64,
    /// Mean accuracy.
    pub average_accuracy: f64,
    /// Oldest first.
    pub trend: Vec<TrendPoint>,
}
