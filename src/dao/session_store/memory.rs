//! Process-local [`SessionStore`] backed by [`DashMap`].
//!
//! The shard write lock held by `get_mut`/`entry` makes each version check and replacement a
//! single atomic step, which gives the same compare-and-set guarantees as the database backends.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{HistoryEntity, SessionEntity, SessionStatusEntity},
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

/// In-memory session store used for local runs and tests.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<DashMap<Uuid, SessionEntity>>,
    history: Arc<DashMap<(Uuid, String), HistoryEntity>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn compare_and_set(&self, session: SessionEntity, expected_version: u64) -> StorageResult<()> {
        let Some(mut stored) = self.sessions.get_mut(&session.id) else {
            return Err(StorageError::conflict("session", session.id));
        };
        if stored.version != expected_version {
            return Err(StorageError::conflict("session", session.id));
        }
        *stored = session;
        Ok(())
    }

    fn insert(&self, session: SessionEntity) -> StorageResult<()> {
        match self.sessions.entry(session.id) {
            Entry::Occupied(_) => Err(StorageError::conflict("session", session.id)),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    fn sessions_with_status(&self, status: SessionStatusEntity, limit: usize) -> Vec<SessionEntity> {
        let mut sessions = self
            .sessions
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.truncate(limit);
        sessions
    }

    fn player_history(&self, player_id: &str, limit: usize) -> Vec<HistoryEntity> {
        let mut records = self
            .history
            .iter()
            .filter(|entry| entry.player_id == player_id)
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        records.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));
        records.truncate(limit);
        records
    }

    fn session_history(&self, session_id: Uuid) -> Vec<HistoryEntity> {
        let mut records = self
            .history
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        records.sort_by(|a, b| a.rank.cmp(&b.rank).then(a.player_id.cmp(&b.player_id)));
        records
    }
}

impl SessionStore for MemorySessionStore {
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let found = self.sessions.get(&id).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(found) })
    }

    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.insert(session);
        Box::pin(async move { result })
    }

    fn update_session(
        &self,
        session: SessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.compare_and_set(session, expected_version);
        Box::pin(async move { result })
    }

    fn list_sessions(
        &self,
        status: SessionStatusEntity,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let sessions = self.sessions_with_status(status, limit);
        Box::pin(async move { Ok(sessions) })
    }

    fn save_history(&self, records: Vec<HistoryEntity>) -> BoxFuture<'static, StorageResult<()>> {
        for record in records {
            self.history
                .insert((record.session_id, record.player_id.clone()), record);
        }
        Box::pin(async { Ok(()) })
    }

    fn find_history_by_player(
        &self,
        player_id: String,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<HistoryEntity>>> {
        let records = self.player_history(&player_id, limit);
        Box::pin(async move { Ok(records) })
    }

    fn find_history_by_session(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<HistoryEntity>>> {
        let records = self.session_history(session_id);
        Box::pin(async move { Ok(records) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn session(version: u64) -> SessionEntity {
        let now = SystemTime::now();
        SessionEntity {
            id: Uuid::new_v4(),
            version,
            players: vec!["p1".into()],
            max_players: 6,
            status: SessionStatusEntity::Waiting,
            scores: Vec::new(),
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

    #[tokio::test]
    async fn create_twice_conflicts() {
        let store = MemorySessionStore::new();
        let doc = session(0);
        store.create_session(doc.clone()).await.unwrap();
        let err = store.create_session(doc).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = MemorySessionStore::new();
        let doc = session(0);
        store.create_session(doc.clone()).await.unwrap();

        let mut first = doc.clone();
        first.version = 1;
        store.update_session(first, 0).await.unwrap();

        let mut second = doc.clone();
        second.version = 1;
        let err = store.update_session(second, 0).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = store.find_session(doc.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn update_of_missing_session_conflicts() {
        let store = MemorySessionStore::new();
        let err = store.update_session(session(1), 0).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn history_is_deduplicated_by_session_and_player() {
        let store = MemorySessionStore::new();
        let session_id = Uuid::new_v4();
        let record = HistoryEntity {
            session_id,
            player_id: "p1".into(),
            answers: Vec::new(),
            final_score: 2,
            duration_ms: 10,
            accuracy: 1.0,
            rank: 1,
            ended_at: SystemTime::now(),
        };

        store.save_history(vec![record.clone()]).await.unwrap();
        store.save_history(vec![record]).await.unwrap();

        assert_eq!(store.find_history_by_session(session_id).await.unwrap().len(), 1);
        assert_eq!(
            store.find_history_by_player("p1".into(), 50).await.unwrap().len(),
            1
        );
    }
}
