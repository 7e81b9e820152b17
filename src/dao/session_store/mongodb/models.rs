use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    HistoryAnswerEntity, HistoryEntity, ScoreEntity, SessionEntity, SessionStatusEntity,
    SubmissionEntity,
};

use super::error::MongoDaoError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: String,
    version: i64,
    players: Vec<String>,
    max_players: i64,
    status: SessionStatusEntity,
    scores: Vec<ScoreEntity>,
    #[serde(default)]
    question_queue: Vec<String>,
    current_index: Option<i64>,
    question_started_at: Option<DateTime>,
    #[serde(default)]
    answered_player_ids: Vec<String>,
    first_correct_player_id: Option<String>,
    #[serde(default)]
    submissions: Vec<MongoSubmission>,
    created_at: DateTime,
    updated_at: DateTime,
    ended_at: Option<DateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoSubmission {
    question_id: String,
    player_id: String,
    answer: String,
    correct: bool,
    time_ms: i64,
    at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoHistoryDocument {
    session_id: String,
    player_id: String,
    answers: Vec<MongoHistoryAnswer>,
    final_score: i64,
    duration_ms: i64,
    accuracy: f64,
    rank: i64,
    ended_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoHistoryAnswer {
    question_id: String,
    correct: bool,
    time_ms: i64,
    answer: String,
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            version: value.version as i64,
            players: value.players,
            max_players: value.max_players as i64,
            status: value.status,
            scores: value.scores,
            question_queue: value.question_queue,
            current_index: value.current_index.map(|index| index as i64),
            question_started_at: value.question_started_at.map(DateTime::from_system_time),
            answered_player_ids: value.answered_player_ids,
            first_correct_player_id: value.first_correct_player_id,
            submissions: value
                .submissions
                .into_iter()
                .map(|submission| MongoSubmission {
                    question_id: submission.question_id,
                    player_id: submission.player_id,
                    answer: submission.answer,
                    correct: submission.correct,
                    time_ms: submission.time_ms as i64,
                    at: DateTime::from_system_time(submission.at),
                })
                .collect(),
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
            ended_at: value.ended_at.map(DateTime::from_system_time),
        }
    }
}

impl TryFrom<MongoSessionDocument> for SessionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoSessionDocument) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id).map_err(|_| MongoDaoError::MalformedSession {
            id: value.id.clone(),
            reason: "identifier is not a UUID",
        })?;

        Ok(Self {
            id,
            version: value.version.max(0) as u64,
            players: value.players,
            max_players: value.max_players.max(0) as usize,
            status: value.status,
            scores: value.scores,
            question_queue: value.question_queue,
            current_index: value.current_index.map(|index| index.max(0) as usize),
            question_started_at: value.question_started_at.map(DateTime::to_system_time),
            answered_player_ids: value.answered_player_ids,
            first_correct_player_id: value.first_correct_player_id,
            submissions: value
                .submissions
                .into_iter()
                .map(|submission| SubmissionEntity {
                    question_id: submission.question_id,
                    player_id: submission.player_id,
                    answer: submission.answer,
                    correct: submission.correct,
                    time_ms: submission.time_ms.max(0) as u64,
                    at: submission.at.to_system_time(),
                })
                .collect(),
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
            ended_at: value.ended_at.map(DateTime::to_system_time),
        })
    }
}

impl From<HistoryEntity> for MongoHistoryDocument {
    fn from(value: HistoryEntity) -> Self {
        Self {
            session_id: value.session_id.to_string(),
            player_id: value.player_id,
            answers: value
                .answers
                .into_iter()
                .map(|answer| MongoHistoryAnswer {
                    question_id: answer.question_id,
                    correct: answer.correct,
                    time_ms: answer.time_ms as i64,
                    answer: answer.answer,
                })
                .collect(),
            final_score: i64::from(value.final_score),
            duration_ms: value.duration_ms as i64,
            accuracy: value.accuracy,
            rank: i64::from(value.rank),
            ended_at: DateTime::from_system_time(value.ended_at),
        }
    }
}

impl MongoHistoryDocument {
    /// Convert back into the storage-agnostic entity, skipping records whose session id is unreadable.
    pub fn into_entity(self) -> Option<HistoryEntity> {
        let session_id = Uuid::parse_str(&self.session_id).ok()?;
        Some(HistoryEntity {
            session_id,
            player_id: self.player_id,
            answers: self
                .answers
                .into_iter()
                .map(|answer| HistoryAnswerEntity {
                    question_id: answer.question_id,
                    correct: answer.correct,
                    time_ms: answer.time_ms.max(0) as u64,
                    answer: answer.answer,
                })
                .collect(),
            final_score: self.final_score.clamp(0, i64::from(u32::MAX)) as u32,
            duration_ms: self.duration_ms.max(0) as u64,
            accuracy: self.accuracy,
            rank: self.rank.clamp(0, i64::from(u32::MAX)) as u32,
            ended_at: self.ended_at.to_system_time(),
        })
    }

    pub fn key(&self) -> Document {
        doc! { "session_id": &self.session_id, "player_id": &self.player_id }
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

pub fn versioned_doc_id(id: Uuid, version: u64) -> Document {
    doc! {"_id": id.to_string(), "version": version as i64}
}
