use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::doc,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoHistoryDocument, MongoSessionDocument, doc_id, versioned_doc_id},
    questions::MongoQuestionSource,
};
use crate::dao::{
    models::{HistoryEntity, SessionEntity, SessionStatusEntity},
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

const SESSION_COLLECTION_NAME: &str = "sessions";
const HISTORY_COLLECTION_NAME: &str = "session_history";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB-backed [`SessionStore`]. Conditional writes filter on `_id` and `version`.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

pub(super) struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    pub(super) async fn database(&self) -> Database {
        let guard = self.state.read().await;
        guard.database.clone()
    }

    async fn ping(&self) -> MongoResult<()> {
        self.database()
            .await
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    /// Question source reading the `questions` collection over the same connection.
    pub fn questions(&self) -> MongoQuestionSource {
        MongoQuestionSource::new(self.inner.clone())
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let sessions = self.collection().await;
        let status_index = IndexModel::builder()
            .keys(doc! {"status": 1, "created_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("session_status_idx".to_owned()))
                    .build(),
            )
            .build();
        sessions
            .create_index(status_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SESSION_COLLECTION_NAME,
                index: "status,created_at",
                source,
            })?;

        // One history record per (session, player); upserts rely on it.
        let history = self.history_collection().await;
        let history_key = IndexModel::builder()
            .keys(doc! {"session_id": 1, "player_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("history_session_player_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        history
            .create_index(history_key)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: HISTORY_COLLECTION_NAME,
                index: "session_id,player_id",
                source,
            })?;

        let history_player = IndexModel::builder()
            .keys(doc! {"player_id": 1, "ended_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("history_player_idx".to_owned()))
                    .build(),
            )
            .build();
        history
            .create_index(history_player)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: HISTORY_COLLECTION_NAME,
                index: "player_id,ended_at",
                source,
            })?;

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoSessionDocument> {
        self.inner
            .database()
            .await
            .collection::<MongoSessionDocument>(SESSION_COLLECTION_NAME)
    }

    async fn history_collection(&self) -> Collection<MongoHistoryDocument> {
        self.inner
            .database()
            .await
            .collection::<MongoHistoryDocument>(HISTORY_COLLECTION_NAME)
    }

    async fn find_session(&self, id: Uuid) -> MongoResult<Option<SessionEntity>> {
        let document = self
            .collection()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadSession {
                id: id.to_string(),
                source,
            })?;

        document.map(SessionEntity::try_from).transpose()
    }

    async fn create_session(&self, session: SessionEntity) -> StorageResult<()> {
        let id = session.id;
        let document: MongoSessionDocument = session.into();
        match self.collection().await.insert_one(&document).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => Err(StorageError::conflict("session", id)),
            Err(source) => Err(MongoDaoError::SaveSession {
                id: id.to_string(),
                source,
            }
            .into()),
        }
    }

    async fn update_session(&self, session: SessionEntity, expected_version: u64) -> StorageResult<()> {
        let id = session.id;
        let document: MongoSessionDocument = session.into();
        let result = self
            .collection()
            .await
            .replace_one(versioned_doc_id(id, expected_version), &document)
            .await
            .map_err(|source| MongoDaoError::SaveSession {
                id: id.to_string(),
                source,
            })?;

        if result.matched_count == 0 {
            return Err(StorageError::conflict("session", id));
        }
        Ok(())
    }

    async fn list_sessions(
        &self,
        status: SessionStatusEntity,
        limit: usize,
    ) -> MongoResult<Vec<SessionEntity>> {
        let documents: Vec<MongoSessionDocument> = self
            .collection()
            .await
            .find(doc! {"status": status.as_str()})
            .sort(doc! {"created_at": -1})
            .limit(limit as i64)
            .await
            .map_err(|source| MongoDaoError::ListSessions { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListSessions { source })?;

        documents.into_iter().map(SessionEntity::try_from).collect()
    }

    async fn save_history(&self, records: Vec<HistoryEntity>) -> MongoResult<()> {
        let collection = self.history_collection().await;
        for record in records {
            let id = record.session_id.to_string();
            let document: MongoHistoryDocument = record.into();
            collection
                .replace_one(document.key(), &document)
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::SaveHistory { id, source })?;
        }
        Ok(())
    }

    async fn find_history(
        &self,
        filter: mongodb::bson::Document,
        sort: mongodb::bson::Document,
        limit: Option<usize>,
    ) -> MongoResult<Vec<HistoryEntity>> {
        let collection = self.history_collection().await;
        let mut find = collection.find(filter).sort(sort);
        if let Some(limit) = limit {
            find = find.limit(limit as i64);
        }

        let documents: Vec<MongoHistoryDocument> = find
            .await
            .map_err(|source| MongoDaoError::LoadHistory { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadHistory { source })?;

        Ok(documents
            .into_iter()
            .filter_map(MongoHistoryDocument::into_entity)
            .collect())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

impl SessionStore for MongoSessionStore {
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(id).await.map_err(Into::into) })
    }

    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.create_session(session).await })
    }

    fn update_session(
        &self,
        session: SessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.update_session(session, expected_version).await })
    }

    fn list_sessions(
        &self,
        status: SessionStatusEntity,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_sessions(status, limit).await.map_err(Into::into) })
    }

    fn save_history(&self, records: Vec<HistoryEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_history(records).await.map_err(Into::into) })
    }

    fn find_history_by_player(
        &self,
        player_id: String,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<HistoryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_history(
                    doc! {"player_id": player_id},
                    doc! {"ended_at": -1},
                    Some(limit),
                )
                .await
                .map_err(Into::into)
        })
    }

    fn find_history_by_session(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<HistoryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_history(
                    doc! {"session_id": session_id.to_string()},
                    doc! {"rank": 1, "player_id": 1},
                    None,
                )
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
