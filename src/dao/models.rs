use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Lifecycle status as persisted by the storage layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatusEntity {
    /// Accepting players.
    Waiting,
    /// Questions are being dealt.
    InProgress,
    /// All questions have been played.
    Completed,
}

impl SessionStatusEntity {
    /// Wire representation used in backend queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatusEntity::Waiting => "waiting",
            SessionStatusEntity::InProgress => "in_progress",
            SessionStatusEntity::Completed => "completed",
        }
    }
}

/// One recorded answer inside a session's submission log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionEntity {
    /// Question the answer was given for.
    pub question_id: String,
    /// Player who answered.
    pub player_id: String,
    /// Raw answer text as submitted.
    pub answer: String,
    /// Whether the answer matched the expected one.
    pub correct: bool,
    /// Milliseconds elapsed since the question became active.
    pub time_ms: u64,
    /// When the answer was recorded.
    pub at: SystemTime,
}

/// Score of a single player inside a session document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreEntity {
    /// Player the score belongs to.
    pub player_id: String,
    /// Points earned so far.
    pub score: u32,
}

/// Aggregate session document persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Monotonic revision counter used for compare-and-set writes.
    pub version: u64,
    /// Joined players, in join order.
    pub players: Vec<String>,
    /// Capacity bound.
    pub max_players: usize,
    /// Lifecycle status.
    pub status: SessionStatusEntity,
    /// Scores keyed by player, in join order.
    pub scores: Vec<ScoreEntity>,
    /// Question identifiers dealt at start.
    pub question_queue: Vec<String>,
    /// Index of the active question.
    pub current_index: Option<usize>,
    /// When the active question was dealt.
    pub question_started_at: Option<SystemTime>,
    /// Players who already answered the active question.
    pub answered_player_ids: Vec<String>,
    /// Player credited for the active question.
    pub first_correct_player_id: Option<String>,
    /// Full answer log.
    pub submissions: Vec<SubmissionEntity>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time the document was written.
    pub updated_at: SystemTime,
    /// Completion timestamp.
    pub ended_at: Option<SystemTime>,
}

/// One answer as summarised inside a history record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryAnswerEntity {
    /// Question the answer was given for.
    pub question_id: String,
    /// Whether it was correct.
    pub correct: bool,
    /// Response time in milliseconds.
    pub time_ms: u64,
    /// Raw answer text.
    pub answer: String,
}

/// Permanent per-player summary of a completed session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntity {
    /// Session the record belongs to.
    pub session_id: Uuid,
    /// Player the record belongs to.
    pub player_id: String,
    /// Answers the player gave, in submission order.
    pub answers: Vec<HistoryAnswerEntity>,
    /// Score at completion.
    pub final_score: u32,
    /// Session duration in milliseconds.
    pub duration_ms: u64,
    /// Ratio of correct answers (0 when nothing was answered).
    pub accuracy: f64,
    /// Dense rank by final score within the session (1 = best).
    pub rank: u32,
    /// When the session completed.
    pub ended_at: SystemTime,
}

/// Question as exposed by the question bank.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Stable identifier.
    pub id: String,
    /// Text shown to players.
    pub prompt: String,
    /// Answer compared against submissions.
    pub expected_answer: String,
    /// Optional category label.
    #[serde(default)]
    pub category: Option<String>,
}
