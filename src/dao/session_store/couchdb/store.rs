use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value};
use tracing::warn;
use uuid::Uuid;

use crate::dao::{
    models::{HistoryEntity, SessionEntity, SessionStatusEntity},
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        CouchHistoryDocument, CouchSessionDocument, FindResponse, history_by_player,
        history_by_session, history_doc_id, history_player_index, session_doc_id,
        session_status_index, sessions_by_status,
    },
};

const SESSION_HISTORY_LIMIT: usize = 1_000;
const HISTORY_UPSERT_ATTEMPTS: usize = 2;

/// Outcome of a document write CouchDB may refuse because of a stale `_rev`.
enum PutOutcome {
    Written,
    Conflict,
}

/// CouchDB-backed [`SessionStore`]. Compare-and-set relies on the document `_rev`.
#[derive(Clone)]
pub struct CouchSessionStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchSessionStore {
    /// Establish a connection to CouchDB and ensure the database and its indexes exist.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        store.ensure_indexes().await?;
        Ok(store)
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.database_url(), path);
        self.authorize(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412 means another instance created it first.
                if create.status().is_success() || create.status() == StatusCode::PRECONDITION_FAILED
                {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn ensure_indexes(&self) -> CouchResult<()> {
        const INDEX: &str = "_index";
        for index in [session_status_index(), history_player_index()] {
            let response = self
                .request(Method::POST, INDEX)
                .json(&index)
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: INDEX.to_string(),
                    source,
                })?;
            if !response.status().is_success() {
                return Err(CouchDaoError::IndexCreate {
                    index: index["name"].as_str().unwrap_or(INDEX).to_owned(),
                    status: response.status(),
                });
            }
        }
        Ok(())
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<PutOutcome>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Ok(PutOutcome::Conflict),
            status if status.is_success() => Ok(PutOutcome::Written),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn find_documents<T>(&self, query: Value) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const FIND: &str = "_find";
        let response = self
            .request(Method::POST, FIND)
            .json(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: FIND.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: FIND.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<FindResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: FIND.to_string(),
                source,
            }
        })?;

        payload
            .docs
            .into_iter()
            .map(|doc| {
                from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: FIND.to_string(),
                    source,
                })
            })
            .collect()
    }

    async fn create(&self, session: SessionEntity) -> StorageResult<()> {
        let id = session.id;
        let doc_id = session_doc_id(id);
        let doc = CouchSessionDocument::new(session, None);
        match self.put_document(&doc_id, &doc).await? {
            PutOutcome::Written => Ok(()),
            PutOutcome::Conflict => Err(StorageError::conflict("session", id)),
        }
    }

    async fn compare_and_set(&self, session: SessionEntity, expected_version: u64) -> StorageResult<()> {
        let id = session.id;
        let doc_id = session_doc_id(id);
        let Some(current) = self.get_document::<CouchSessionDocument>(&doc_id).await? else {
            return Err(StorageError::conflict("session", id));
        };
        if current.session.version != expected_version {
            return Err(StorageError::conflict("session", id));
        }

        // A concurrent writer between the read and this PUT bumps `_rev`, which CouchDB rejects.
        let doc = CouchSessionDocument::new(session, current.rev);
        match self.put_document(&doc_id, &doc).await? {
            PutOutcome::Written => Ok(()),
            PutOutcome::Conflict => Err(StorageError::conflict("session", id)),
        }
    }

    async fn upsert_history(&self, record: HistoryEntity) -> StorageResult<()> {
        let doc_id = history_doc_id(record.session_id, &record.player_id);
        // Retry once on a racing upsert; both writers carry identical content.
        for _ in 0..HISTORY_UPSERT_ATTEMPTS {
            let rev = self
                .get_document::<CouchHistoryDocument>(&doc_id)
                .await?
                .and_then(|existing| existing.rev);
            let doc = CouchHistoryDocument::new(record.clone(), rev);
            if let PutOutcome::Written = self.put_document(&doc_id, &doc).await? {
                return Ok(());
            }
        }
        warn!(doc_id = %doc_id, "history upsert kept conflicting");
        Err(StorageError::conflict("history", doc_id))
    }
}

impl SessionStore for CouchSessionStore {
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = session_doc_id(id);
            let maybe_doc = store.get_document::<CouchSessionDocument>(&doc_id).await?;
            Ok(maybe_doc.map(|doc| doc.session))
        })
    }

    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.create(session).await })
    }

    fn update_session(
        &self,
        session: SessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.compare_and_set(session, expected_version).await })
    }

    fn list_sessions(
        &self,
        status: SessionStatusEntity,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .find_documents::<CouchSessionDocument>(sessions_by_status(status, limit))
                .await?;
            Ok(docs.into_iter().map(|doc| doc.session).collect())
        })
    }

    fn save_history(&self, records: Vec<HistoryEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            for record in records {
                store.upsert_history(record).await?;
            }
            Ok(())
        })
    }

    fn find_history_by_player(
        &self,
        player_id: String,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<HistoryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .find_documents::<CouchHistoryDocument>(history_by_player(&player_id, limit))
                .await?;
            Ok(docs.into_iter().map(|doc| doc.record).collect())
        })
    }

    fn find_history_by_session(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<HistoryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .find_documents::<CouchHistoryDocument>(history_by_session(
                    session_id,
                    SESSION_HISTORY_LIMIT,
                ))
                .await?;
            let mut records: Vec<HistoryEntity> = docs.into_iter().map(|doc| doc.record).collect();
            records.sort_by(|a, b| a.rank.cmp(&b.rank).then(a.player_id.cmp(&b.player_id)));
            Ok(records)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .authorize(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use std::{net::SocketAddr, time::SystemTime};

    use axum::{
        Router,
        http::StatusCode,
        routing::{get, post},
    };
    use tokio::net::TcpListener;

    use super::*;

    /// Local CouchDB stand-in refusing every index and every document write.
    async fn refusing_server() -> SocketAddr {
        let app = Router::new()
            .route(
                "/{db}/_index",
                post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
            .route(
                "/{db}/{doc}",
                get(|| async { StatusCode::NOT_FOUND }).put(|| async { StatusCode::CONFLICT }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        addr
    }

    fn store(addr: SocketAddr) -> CouchSessionStore {
        CouchSessionStore {
            client: Client::new(),
            base_url: Arc::from(format!("http://{addr}")),
            database: Arc::from("frenzy"),
            auth: None,
        }
    }

    #[tokio::test]
    async fn refused_index_names_the_index() {
        let addr = refusing_server().await;
        match store(addr).ensure_indexes().await {
            Err(CouchDaoError::IndexCreate { index, status }) => {
                assert_eq!(index, "session-status-created");
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn conflicting_history_upsert_is_reported() {
        let addr = refusing_server().await;
        let record = HistoryEntity {
            session_id: Uuid::new_v4(),
            player_id: "p1".into(),
            answers: Vec::new(),
            final_score: 0,
            duration_ms: 0,
            accuracy: 0.0,
            rank: 1,
            ended_at: SystemTime::now(),
        };

        let err = store(addr).save_history(vec![record]).await.unwrap_err();
        assert!(err.is_conflict());
    }
}
