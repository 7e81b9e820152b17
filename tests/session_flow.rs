use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;
use uuid::Uuid;

use frenzy_back::{
    config::AppConfig,
    dao::{
        models::{HistoryEntity, QuestionEntity, SessionEntity, SessionStatusEntity},
        session_store::{SessionStore, memory::MemorySessionStore},
        storage::{StorageError, StorageResult},
    },
    dto::{
        session::{CreateSessionRequest, JoinSessionRequest, SessionView, SubmitAnswerRequest},
        sse::ServerEvent,
    },
    error::{AppError, ServiceError},
    services::{answer_service, history_service, session_service},
    state::{AppState, PublishError, SharedState, StatePublisher, state_machine::SessionStatus},
};

fn question(id: &str, prompt: &str, answer: &str) -> QuestionEntity {
    QuestionEntity {
        id: id.into(),
        prompt: prompt.into(),
        expected_answer: answer.into(),
        category: None,
    }
}

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.questions = vec![
        question("q1", "What is the capital of France?", "Paris"),
        question("q2", "What is the chemical symbol for gold?", "Au"),
    ];
    config.questions_per_session = 2;
    config.store.max_attempts = 25;
    config
}

fn expected_answer(question_id: &str) -> &'static str {
    match question_id {
        "q1" => "Paris",
        _ => "Au",
    }
}

async fn with_store(state: SharedState, store: Arc<dyn SessionStore>) -> SharedState {
    state.set_session_store(store).await;
    state
}

async fn ready_state() -> SharedState {
    with_store(AppState::new(config()), Arc::new(MemorySessionStore::new())).await
}

async fn lobby(state: &SharedState, players: &[&str]) -> SessionView {
    let mut session = session_service::create_session(
        state,
        CreateSessionRequest {
            player_id: players[0].into(),
            max_players: Some(6),
        },
    )
    .await
    .unwrap();
    for player in &players[1..] {
        session = session_service::join_session(
            state,
            session.id,
            JoinSessionRequest {
                player_id: (*player).into(),
            },
        )
        .await
        .unwrap();
    }
    session
}

async fn answer(
    state: &SharedState,
    session_id: Uuid,
    player: &str,
    text: &str,
) -> Result<frenzy_back::dto::session::AnswerResponse, ServiceError> {
    answer_service::submit_answer(
        state,
        session_id,
        SubmitAnswerRequest {
            player_id: player.into(),
            answer: text.into(),
        },
    )
    .await
}

fn active_question(session: &SessionView) -> String {
    session
        .current_question_id
        .clone()
        .expect("session has an active question")
}

#[tokio::test]
async fn two_player_match_from_lobby_to_history() {
    let state = ready_state().await;
    let session = lobby(&state, &["p1", "p2"]).await;
    assert_eq!(session.status, SessionStatus::Waiting);

    let started = session_service::start_session(&state, session.id).await.unwrap();
    assert_eq!(started.status, SessionStatus::InProgress);
    assert_eq!(started.current_index, Some(0));
    let first = active_question(&started);

    let wrong = answer(&state, session.id, "p2", "nope").await.unwrap();
    assert!(!wrong.correct);
    let right = answer(&state, session.id, "p1", &format!("  {} ", expected_answer(&first).to_uppercase()))
        .await
        .unwrap();
    assert!(right.correct);
    assert_eq!(right.session.first_correct_player_id.as_deref(), Some("p1"));
    assert_eq!(right.session.scores["p1"], 1);

    let advanced = session_service::advance_session(&state, session.id).await.unwrap();
    let second = active_question(&advanced);
    assert_ne!(first, second);
    assert!(advanced.answered_player_ids.is_empty());
    assert!(advanced.first_correct_player_id.is_none());

    answer(&state, session.id, "p2", expected_answer(&second)).await.unwrap();
    let late = answer(&state, session.id, "p1", expected_answer(&second)).await.unwrap();
    assert!(late.correct);
    assert_eq!(late.session.first_correct_player_id.as_deref(), Some("p2"));
    assert_eq!(late.session.scores["p1"], 1);
    assert_eq!(late.session.scores["p2"], 1);

    let completed = session_service::advance_session(&state, session.id).await.unwrap();
    assert_eq!(completed.status, SessionStatus::Completed);
    assert!(completed.current_question_id.is_none());
    assert!(completed.ended_at.is_some());

    let recap = history_service::get_match_history(&state, session.id).await.unwrap();
    assert_eq!(recap.records.len(), 2);
    assert!(recap.records.iter().all(|record| record.rank == 1));
    assert_eq!(recap.breakdown.len(), 4);
    assert!(recap.breakdown.iter().all(|entry| entry.prompt != "Unknown"));

    let p1 = history_service::get_history(&state, "p1").await.unwrap();
    assert_eq!(p1.len(), 1);
    assert_eq!(p1[0].final_score, 1);
    assert_eq!(p1[0].accuracy, 1.0);

    let p2 = history_service::get_history(&state, "p2").await.unwrap();
    assert_eq!(p2[0].accuracy, 0.5);

    let stats = history_service::get_player_stats(&state, "p1").await.unwrap();
    assert_eq!(stats.total_matches, 1);
    assert_eq!(stats.wins, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_correct_answers_credit_exactly_one_player() {
    let players = ["p1", "p2", "p3", "p4", "p5", "p6"];
    let state = ready_state().await;
    let session = lobby(&state, &players).await;
    let started = session_service::start_session(&state, session.id).await.unwrap();
    let correct = expected_answer(&active_question(&started));

    let session_id = session.id;
    let handles = players.map(|player| {
        let state = state.clone();
        tokio::spawn(async move { answer(&state, session_id, player, correct).await })
    });
    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        assert!(response.correct);
    }

    let final_view = session_service::get_session(&state, session.id).await.unwrap();
    let winner = final_view.first_correct_player_id.clone().unwrap();
    assert_eq!(final_view.scores.values().sum::<u32>(), 1);
    assert_eq!(final_view.scores[&winner], 1);
    assert_eq!(final_view.answered_player_ids.len(), players.len());
    assert_eq!(final_view.submissions.len(), players.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_answers_from_one_player_are_recorded_once() {
    let state = ready_state().await;
    let session = lobby(&state, &["p1", "p2"]).await;
    let started = session_service::start_session(&state, session.id).await.unwrap();
    let correct = expected_answer(&active_question(&started));

    let session_id = session.id;
    let handles: Vec<_> = (0..5)
        .map(|_| {
            let state = state.clone();
            tokio::spawn(async move { answer(&state, session_id, "p1", correct).await })
        })
        .collect();
    let mut fresh = 0;
    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        assert!(response.correct);
        if !response.already_answered {
            fresh += 1;
        }
    }
    assert_eq!(fresh, 1);

    let view = session_service::get_session(&state, session.id).await.unwrap();
    assert_eq!(view.scores["p1"], 1);
    assert_eq!(view.submissions.len(), 1);
}

#[tokio::test]
async fn seventh_player_is_turned_away() {
    let state = ready_state().await;
    let session = lobby(&state, &["p1", "p2", "p3", "p4", "p5", "p6"]).await;
    assert_eq!(session.players.len(), 6);

    let err = session_service::join_session(
        &state,
        session.id,
        JoinSessionRequest {
            player_id: "p7".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::Capacity(_)));
}

#[tokio::test]
async fn joining_twice_changes_nothing() {
    let state = ready_state().await;
    let session = lobby(&state, &["p1", "p2"]).await;

    let again = session_service::join_session(
        &state,
        session.id,
        JoinSessionRequest {
            player_id: "p2".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(again.players, vec!["p1".to_string(), "p2".to_string()]);
    assert_eq!(again.version, session.version);
}

#[tokio::test]
async fn lifecycle_only_moves_forward() {
    let state = ready_state().await;
    let session = lobby(&state, &["p1"]).await;

    let early = answer(&state, session.id, "p1", "Paris").await.unwrap_err();
    assert!(matches!(early, ServiceError::InvalidState(_)));
    let early = session_service::advance_session(&state, session.id).await.unwrap_err();
    assert!(matches!(early, ServiceError::InvalidState(_)));

    let started = session_service::start_session(&state, session.id).await.unwrap();
    let again = session_service::start_session(&state, session.id).await.unwrap_err();
    assert!(matches!(again, ServiceError::InvalidState(_)));
    let late_join = session_service::join_session(
        &state,
        session.id,
        JoinSessionRequest {
            player_id: "p2".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(late_join, ServiceError::InvalidState(_)));

    let stranger = answer(&state, session.id, "p9", "Paris").await.unwrap_err();
    assert!(matches!(stranger, ServiceError::InvalidState(_)));

    let mut version = started.version;
    let mut last = started;
    while last.status != SessionStatus::Completed {
        last = session_service::advance_session(&state, session.id).await.unwrap();
        assert!(last.version > version);
        version = last.version;
    }
    assert_eq!(last.current_index, Some(1));

    let after = session_service::advance_session(&state, session.id).await.unwrap_err();
    assert!(matches!(after, ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn unknown_sessions_and_blank_ids_are_rejected() {
    let state = ready_state().await;

    let missing = session_service::get_session(&state, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(missing, ServiceError::NotFound(_)));

    let blank = session_service::create_session(
        &state,
        CreateSessionRequest {
            player_id: "   ".into(),
            max_players: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(blank, ServiceError::InvalidInput(_)));
}

#[tokio::test]
async fn empty_question_bank_keeps_the_session_waiting() {
    let mut config = config();
    config.questions.clear();
    let state = with_store(AppState::new(config), Arc::new(MemorySessionStore::new())).await;
    let session = lobby(&state, &["p1"]).await;

    let err = session_service::start_session(&state, session.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let view = session_service::get_session(&state, session.id).await.unwrap();
    assert_eq!(view.status, SessionStatus::Waiting);
}

#[tokio::test]
async fn operations_fail_fast_without_storage() {
    let state = AppState::new(config());
    let err = session_service::create_session(
        &state,
        CreateSessionRequest {
            player_id: "p1".into(),
            max_players: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::Degraded));
}

#[tokio::test]
async fn open_lobbies_exclude_started_sessions() {
    let state = ready_state().await;
    let open = lobby(&state, &["p1"]).await;
    let started = lobby(&state, &["p2"]).await;
    session_service::start_session(&state, started.id).await.unwrap();

    let lobbies = session_service::list_open_sessions(&state).await.unwrap();
    assert_eq!(lobbies.len(), 1);
    assert_eq!(lobbies[0].id, open.id);
}

/// Publisher that refuses every event.
struct RejectingPublisher;

impl StatePublisher for RejectingPublisher {
    fn publish(&self, _event: ServerEvent) -> Result<(), PublishError> {
        Err(PublishError::Rejected("offline".into()))
    }
}

#[tokio::test]
async fn publisher_failures_do_not_fail_operations() {
    let state = with_store(
        AppState::with_publisher(config(), Arc::new(RejectingPublisher)),
        Arc::new(MemorySessionStore::new()),
    )
    .await;
    let session = lobby(&state, &["p1", "p2"]).await;
    let started = session_service::start_session(&state, session.id).await.unwrap();

    let response = answer(&state, session.id, "p1", expected_answer(&active_question(&started)))
        .await
        .unwrap();
    assert_eq!(response.session.scores["p1"], 1);
}

/// Publisher keeping every event for inspection.
#[derive(Default)]
struct RecordingPublisher {
    events: Mutex<Vec<ServerEvent>>,
}

impl StatePublisher for RecordingPublisher {
    fn publish(&self, event: ServerEvent) -> Result<(), PublishError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[tokio::test]
async fn committed_changes_are_published_per_session() {
    let publisher = Arc::new(RecordingPublisher::default());
    let state = with_store(
        AppState::with_publisher(config(), publisher.clone()),
        Arc::new(MemorySessionStore::new()),
    )
    .await;
    let session = lobby(&state, &["p1", "p2"]).await;
    let started = session_service::start_session(&state, session.id).await.unwrap();
    answer(&state, session.id, "p2", expected_answer(&active_question(&started)))
        .await
        .unwrap();

    let events = publisher.events.lock().unwrap();
    let names: Vec<_> = events.iter().filter_map(|e| e.event.as_deref()).collect();
    assert_eq!(
        names,
        vec!["session.updated", "session.updated", "session.updated", "session.updated", "answer"]
    );
    assert!(events.iter().all(|e| e.session_id == Some(session.id)));
}

/// Memory store with switchable faults.
#[derive(Clone, Default)]
struct FaultyStore {
    inner: MemorySessionStore,
    fail_history: Arc<AtomicBool>,
    slow_reads: Arc<AtomicBool>,
    conflict_writes: Arc<AtomicBool>,
}

const SLOW_READ: Duration = Duration::from_millis(500);

impl SessionStore for FaultyStore {
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let read = self.inner.find_session(id);
        if self.slow_reads.load(Ordering::SeqCst) {
            return Box::pin(async move {
                tokio::time::sleep(SLOW_READ).await;
                read.await
            });
        }
        read
    }

    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.create_session(session)
    }

    fn update_session(
        &self,
        session: SessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        if self.conflict_writes.load(Ordering::SeqCst) {
            let id = session.id;
            return Box::pin(async move { Err(StorageError::conflict("session", id)) });
        }
        self.inner.update_session(session, expected_version)
    }

    fn list_sessions(
        &self,
        status: SessionStatusEntity,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        self.inner.list_sessions(status, limit)
    }

    fn save_history(&self, records: Vec<HistoryEntity>) -> BoxFuture<'static, StorageResult<()>> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Box::pin(async {
                Err(StorageError::unavailable(
                    "history write refused".into(),
                    io::Error::other("offline"),
                ))
            });
        }
        self.inner.save_history(records)
    }

    fn find_history_by_player(
        &self,
        player_id: String,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<HistoryEntity>>> {
        self.inner.find_history_by_player(player_id, limit)
    }

    fn find_history_by_session(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<HistoryEntity>>> {
        self.inner.find_history_by_session(session_id)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}

#[tokio::test]
async fn missing_history_is_backfilled_on_read() {
    let store = FaultyStore::default();
    store.fail_history.store(true, Ordering::SeqCst);
    let state = with_store(AppState::new(config()), Arc::new(store.clone())).await;

    let session = lobby(&state, &["p1", "p2"]).await;
    let started = session_service::start_session(&state, session.id).await.unwrap();
    answer(&state, session.id, "p1", expected_answer(&active_question(&started)))
        .await
        .unwrap();
    session_service::advance_session(&state, session.id).await.unwrap();
    let completed = session_service::advance_session(&state, session.id).await.unwrap();
    assert_eq!(completed.status, SessionStatus::Completed);
    assert!(store.inner.find_history_by_session(session.id).await.unwrap().is_empty());

    store.fail_history.store(false, Ordering::SeqCst);
    let recap = history_service::get_match_history(&state, session.id).await.unwrap();
    assert_eq!(recap.records.len(), 2);
    assert_eq!(recap.records[0].player_id, "p1");
    assert_eq!(recap.records[0].rank, 1);
    assert_eq!(recap.records[1].rank, 2);

    let stored = store.inner.find_history_by_session(session.id).await.unwrap();
    assert_eq!(stored.len(), 2);

    let again = history_service::get_match_history(&state, session.id).await.unwrap();
    assert_eq!(again.records.len(), 2);
}

#[tokio::test]
async fn slow_store_calls_time_out_as_unavailable() {
    let store = FaultyStore::default();
    let mut config = config();
    config.store.operation_timeout = Duration::from_millis(50);
    let state = with_store(AppState::new(config), Arc::new(store.clone())).await;
    let session = lobby(&state, &["p1"]).await;

    store.slow_reads.store(true, Ordering::SeqCst);
    let read = session_service::get_session(&state, session.id).await.unwrap_err();
    assert!(matches!(read, ServiceError::Timeout));
    assert_eq!(AppError::from(read).code(), "upstream_unavailable");

    let join = session_service::join_session(
        &state,
        session.id,
        JoinSessionRequest {
            player_id: "p2".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(join, ServiceError::Timeout));

    store.slow_reads.store(false, Ordering::SeqCst);
    let view = session_service::get_session(&state, session.id).await.unwrap();
    assert_eq!(view.players, vec!["p1".to_string()]);
}

#[tokio::test]
async fn exhausted_retries_surface_as_unavailable() {
    let store = FaultyStore::default();
    let mut config = config();
    config.store.max_attempts = 3;
    config.store.base_backoff = Duration::from_millis(1);
    config.store.max_backoff = Duration::from_millis(2);
    let state = with_store(AppState::new(config), Arc::new(store.clone())).await;
    let session = lobby(&state, &["p1"]).await;

    store.conflict_writes.store(true, Ordering::SeqCst);
    let err = session_service::join_session(
        &state,
        session.id,
        JoinSessionRequest {
            player_id: "p2".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(&err, ServiceError::Unavailable(source) if source.is_conflict()));
    assert_eq!(AppError::from(err).code(), "upstream_unavailable");

    let view = session_service::get_session(&state, session.id).await.unwrap();
    assert_eq!(view.players.len(), 1);
    assert_eq!(view.version, session.version);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_never_exceed_capacity() {
    let state = ready_state().await;
    let session = lobby(&state, &["host"]).await;
    let session_id = session.id;

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let state = state.clone();
            tokio::spawn(async move {
                session_service::join_session(
                    &state,
                    session_id,
                    JoinSessionRequest {
                        player_id: format!("guest-{i}"),
                    },
                )
                .await
            })
        })
        .collect();

    let mut joined = 0;
    let mut turned_away = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => joined += 1,
            Err(ServiceError::Capacity(_)) => turned_away += 1,
            Err(other) => panic!("unexpected join failure: {other}"),
        }
    }
    assert_eq!((joined, turned_away), (5, 5));

    let view = session_service::get_session(&state, session_id).await.unwrap();
    assert_eq!(view.players.len(), 6);
    assert_eq!(view.scores.len(), 6);
    assert_eq!(view.version, session.version + 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_advances_both_commit() {
    let state = ready_state().await;
    let session = lobby(&state, &["p1", "p2"]).await;
    let started = session_service::start_session(&state, session.id).await.unwrap();
    let session_id = session.id;

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let state = state.clone();
            tokio::spawn(async move { session_service::advance_session(&state, session_id).await })
        })
        .collect();
    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap().unwrap().status);
    }
    assert!(statuses.contains(&SessionStatus::InProgress));
    assert!(statuses.contains(&SessionStatus::Completed));

    let view = session_service::get_session(&state, session_id).await.unwrap();
    assert_eq!(view.status, SessionStatus::Completed);
    assert_eq!(view.current_index, Some(1));
    assert_eq!(view.version, started.version + 2);
}
