//! Compare-and-set driver shared by every session mutation.

use std::{future::Future, time::{Duration, SystemTime}};

use rand::Rng;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::storage::{StorageError, StorageResult},
    error::ServiceError,
    services::sse_events::publish_session,
    state::{SharedState, session::Session},
};

/// What a mutation closure decided after inspecting the latest session.
#[derive(Debug)]
pub enum Mutation<T> {
    /// The session was changed and must be written back.
    Commit(T),
    /// Nothing changed; the read value is returned as is.
    Unchanged(T),
}

/// Result of [`run_conditional_update`].
#[derive(Debug)]
pub struct Update<T> {
    /// Value produced by the mutation closure.
    pub value: T,
    /// Session as stored after the call.
    pub session: Session,
    /// Whether a write happened.
    pub committed: bool,
}

/// Await a store call under `limit`, mapping expiry to [`ServiceError::Timeout`].
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = StorageResult<T>>,
) -> Result<T, ServiceError> {
    match timeout(limit, call).await {
        Ok(result) => result.map_err(ServiceError::from),
        Err(_) => Err(ServiceError::Timeout),
    }
}

/// Apply `mutate` to the latest stored revision of a session and write it back atomically.
///
/// Each attempt re-reads the document, so the closure always decides against current state.
/// A lost race backs off with jitter and retries; exhausting the attempts surfaces
/// [`ServiceError::Unavailable`]. Committed sessions are published before returning.
pub async fn run_conditional_update<T, F>(
    state: &SharedState,
    session_id: Uuid,
    mut mutate: F,
) -> Result<Update<T>, ServiceError>
where
    F: FnMut(&mut Session) -> Result<Mutation<T>, ServiceError>,
{
    let policy = state.config().store;
    let store = state.require_session_store().await?;

    for attempt in 1..=policy.max_attempts {
        let entity = with_timeout(policy.operation_timeout, store.find_session(session_id))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}`")))?;

        let mut session = Session::from(entity);
        let expected_version = session.version;

        let value = match mutate(&mut session)? {
            Mutation::Unchanged(value) => {
                return Ok(Update {
                    value,
                    session,
                    committed: false,
                });
            }
            Mutation::Commit(value) => value,
        };

        session.version = expected_version + 1;
        session.updated_at = SystemTime::now();

        let write = store.update_session(session.clone().into(), expected_version);
        match timeout(policy.operation_timeout, write).await {
            Err(_) => return Err(ServiceError::Timeout),
            Ok(Ok(())) => {
                publish_session(state, &session);
                return Ok(Update {
                    value,
                    session,
                    committed: true,
                });
            }
            Ok(Err(err)) if err.is_conflict() => {
                debug!(
                    session_id = %session_id,
                    attempt,
                    expected_version,
                    "conditional write lost the race; retrying"
                );
                if attempt < policy.max_attempts {
                    let ceiling = policy.backoff_ceiling(attempt).as_millis() as u64;
                    let jitter = rand::rng().random_range(0..=ceiling);
                    sleep(Duration::from_millis(jitter)).await;
                }
            }
            Ok(Err(err)) => return Err(err.into()),
        }
    }

    warn!(
        session_id = %session_id,
        attempts = policy.max_attempts,
        "conditional write retries exhausted"
    );
    Err(ServiceError::Unavailable(StorageError::conflict(
        "session", session_id,
    )))
}
