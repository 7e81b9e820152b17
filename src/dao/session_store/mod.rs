#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{HistoryEntity, SessionEntity, SessionStatusEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer for session documents and their history records.
///
/// Every write to a session goes through [`SessionStore::update_session`], which only commits
/// when the stored document still carries `expected_version`. Callers re-read and re-evaluate
/// their mutation when it returns [`StorageError::Conflict`](crate::dao::storage::StorageError).
pub trait SessionStore: Send + Sync {
    /// Fetch the latest stored revision of a session.
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Insert a new session, failing with a conflict when the id is already taken.
    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Replace a session only if the stored version equals `expected_version`.
    fn update_session(
        &self,
        session: SessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// List sessions in the given status, newest first.
    fn list_sessions(
        &self,
        status: SessionStatusEntity,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>>;
    /// Upsert history records keyed by `(session_id, player_id)`.
    fn save_history(&self, records: Vec<HistoryEntity>) -> BoxFuture<'static, StorageResult<()>>;
    /// History records of a player, most recently ended first.
    fn find_history_by_player(
        &self,
        player_id: String,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<HistoryEntity>>>;
    /// History records produced for a single session.
    fn find_history_by_session(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<HistoryEntity>>>;
    /// Cheap liveness check against the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
