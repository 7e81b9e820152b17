use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::dao::models::{HistoryEntity, SessionEntity, SessionStatusEntity};

pub const SESSION_TYPE: &str = "session";
pub const HISTORY_TYPE: &str = "history";

#[derive(Debug, Deserialize)]
pub struct FindResponse {
    pub docs: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchSessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    /// Sortable mirror of `created_at` for Mango queries.
    pub created_at_ms: u64,
    #[serde(flatten)]
    pub session: SessionEntity,
}

impl CouchSessionDocument {
    pub fn new(session: SessionEntity, rev: Option<String>) -> Self {
        Self {
            id: session_doc_id(session.id),
            rev,
            kind: SESSION_TYPE.to_owned(),
            created_at_ms: epoch_millis(session.created_at),
            session,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchHistoryDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub ended_at_ms: u64,
    #[serde(flatten)]
    pub record: HistoryEntity,
}

impl CouchHistoryDocument {
    pub fn new(record: HistoryEntity, rev: Option<String>) -> Self {
        Self {
            id: history_doc_id(record.session_id, &record.player_id),
            rev,
            kind: HISTORY_TYPE.to_owned(),
            ended_at_ms: epoch_millis(record.ended_at),
            record,
        }
    }
}

pub fn session_doc_id(id: Uuid) -> String {
    format!("{SESSION_TYPE}::{id}")
}

pub fn history_doc_id(session_id: Uuid, player_id: &str) -> String {
    format!("{HISTORY_TYPE}::{session_id}::{player_id}")
}

/// Mango index backing `list_sessions`.
pub fn session_status_index() -> Value {
    json!({
        "index": {"fields": ["type", "status", "created_at_ms"]},
        "name": "session-status-created",
        "type": "json",
    })
}

/// Mango index backing `find_history_by_player`.
pub fn history_player_index() -> Value {
    json!({
        "index": {"fields": ["type", "player_id", "ended_at_ms"]},
        "name": "history-player-ended",
        "type": "json",
    })
}

pub fn sessions_by_status(status: SessionStatusEntity, limit: usize) -> Value {
    json!({
        "selector": {"type": SESSION_TYPE, "status": status.as_str()},
        "sort": [{"type": "desc"}, {"status": "desc"}, {"created_at_ms": "desc"}],
        "limit": limit,
    })
}

pub fn history_by_player(player_id: &str, limit: usize) -> Value {
    json!({
        "selector": {"type": HISTORY_TYPE, "player_id": player_id},
        "sort": [{"type": "desc"}, {"player_id": "desc"}, {"ended_at_ms": "desc"}],
        "limit": limit,
    })
}

pub fn history_by_session(session_id: Uuid, limit: usize) -> Value {
    json!({
        "selector": {"type": HISTORY_TYPE, "session_id": session_id},
        "limit": limit,
    })
}

fn epoch_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
