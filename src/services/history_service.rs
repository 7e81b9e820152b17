//! History aggregation and the read models built on top of it.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::{HistoryAnswerEntity, HistoryEntity},
    dto::{
        format_system_time,
        history::{
            BreakdownEntry, HistoryRecordView, MatchHistoryResponse, PlayerStatsResponse,
            TrendPoint,
        },
        session::SessionView,
    },
    error::ServiceError,
    services::session_service::{ensure_player_id, load_session},
    state::{
        SharedState,
        session::Session,
        state_machine::SessionStatus,
        transitions::with_timeout,
    },
};

/// Records returned by [`get_history`].
pub const PLAYER_HISTORY_LIMIT: usize = 50;
/// Records considered by [`get_player_stats`].
pub const PLAYER_STATS_WINDOW: usize = 200;
const UNKNOWN_PROMPT: &str = "Unknown";

/// Summarise a completed session into one record per player.
///
/// Pure function of the snapshot: recomputing it yields identical records, and the store
/// de-duplicates them by `(session_id, player_id)`.
pub fn aggregate(session: &Session) -> Vec<HistoryEntity> {
    let ended_at = session.ended_at.unwrap_or(session.updated_at);
    let duration_ms = ended_at
        .duration_since(session.created_at)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64;

    let mut distinct_scores: Vec<u32> = session.scores.values().copied().collect();
    distinct_scores.sort_unstable_by(|a, b| b.cmp(a));
    distinct_scores.dedup();

    session
        .players
        .iter()
        .map(|player_id| {
            let answers: Vec<HistoryAnswerEntity> = session
                .submissions
                .iter()
                .filter(|s| &s.player_id == player_id)
                .map(|s| HistoryAnswerEntity {
                    question_id: s.question_id.clone(),
                    correct: s.correct,
                    time_ms: s.time_ms,
                    answer: s.answer.clone(),
                })
                .collect();
            let correct = answers.iter().filter(|a| a.correct).count();
            let accuracy = if answers.is_empty() {
                0.0
            } else {
                correct as f64 / answers.len() as f64
            };
            let final_score = session.scores.get(player_id).copied().unwrap_or(0);
            let rank = distinct_scores
                .iter()
                .position(|score| *score == final_score)
                .unwrap_or(0) as u32
                + 1;

            HistoryEntity {
                session_id: session.id,
                player_id: player_id.clone(),
                answers,
                final_score,
                duration_ms,
                accuracy,
                rank,
                ended_at,
            }
        })
        .collect()
}

/// Persist the history records of a freshly completed session.
pub async fn record_completion(state: &SharedState, session: &Session) -> Result<(), ServiceError> {
    let records = aggregate(session);
    let count = records.len();
    let store = state.require_session_store().await?;
    with_timeout(
        state.config().store.operation_timeout,
        store.save_history(records),
    )
    .await?;
    info!(session_id = %session.id, records = count, "history recorded");
    Ok(())
}

/// Most recent history records of a player.
pub async fn get_history(
    state: &SharedState,
    player_id: &str,
) -> Result<Vec<HistoryRecordView>, ServiceError> {
    let player_id = ensure_player_id(player_id)?;
    let store = state.require_session_store().await?;
    let records = with_timeout(
        state.config().store.operation_timeout,
        store.find_history_by_player(player_id, PLAYER_HISTORY_LIMIT),
    )
    .await?;
    Ok(records.into_iter().map(Into::into).collect())
}

/// Session snapshot, its history records and the per-submission breakdown.
///
/// Records missing for a completed session are recomputed and stored before answering.
pub async fn get_match_history(
    state: &SharedState,
    session_id: Uuid,
) -> Result<MatchHistoryResponse, ServiceError> {
    let session = load_session(state, session_id).await?;
    let store = state.require_session_store().await?;
    let timeout = state.config().store.operation_timeout;

    let mut records = with_timeout(timeout, store.find_history_by_session(session_id)).await?;
    if session.status == SessionStatus::Completed && records.len() < session.players.len() {
        let stored: HashSet<String> = records.iter().map(|r| r.player_id.clone()).collect();
        let missing: Vec<HistoryEntity> = aggregate(&session)
            .into_iter()
            .filter(|record| !stored.contains(&record.player_id))
            .collect();
        if !missing.is_empty() {
            info!(session_id = %session_id, records = missing.len(), "backfilling history");
            with_timeout(timeout, store.save_history(missing.clone())).await?;
            records.extend(missing);
            records.sort_by(|a, b| a.rank.cmp(&b.rank).then(a.player_id.cmp(&b.player_id)));
        }
    }

    let breakdown = breakdown(state, &session).await?;
    Ok(MatchHistoryResponse {
        session: SessionView::from(&session),
        records: records.into_iter().map(Into::into).collect(),
        breakdown,
    })
}

async fn breakdown(
    state: &SharedState,
    session: &Session,
) -> Result<Vec<BreakdownEntry>, ServiceError> {
    let source = state.question_source().await;
    let timeout = state.config().store.operation_timeout;

    let mut prompts = HashMap::new();
    for submission in &session.submissions {
        if prompts.contains_key(&submission.question_id) {
            continue;
        }
        let prompt = with_timeout(timeout, source.get_question(submission.question_id.clone()))
            .await?
            .map(|question| question.prompt)
            .unwrap_or_else(|| UNKNOWN_PROMPT.to_owned());
        prompts.insert(submission.question_id.clone(), prompt);
    }

    Ok(session
        .submissions
        .iter()
        .map(|s| BreakdownEntry {
            question_id: s.question_id.clone(),
            prompt: prompts
                .get(&s.question_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_PROMPT.to_owned()),
            player_id: s.player_id.clone(),
            answer: s.answer.clone(),
            correct: s.correct,
            time_ms: s.time_ms,
        })
        .collect())
}

/// Aggregate statistics over the player's recent matches.
pub async fn get_player_stats(
    state: &SharedState,
    player_id: &str,
) -> Result<PlayerStatsResponse, ServiceError> {
    let player_id = ensure_player_id(player_id)?;
    let store = state.require_session_store().await?;
    let records = with_timeout(
        state.config().store.operation_timeout,
        store.find_history_by_player(player_id.clone(), PLAYER_STATS_WINDOW),
    )
    .await?;
    Ok(player_stats(player_id, &records))
}

/// Statistics over `records`, which are ordered most recent first.
pub fn player_stats(player_id: String, records: &[HistoryEntity]) -> PlayerStatsResponse {
    let total = records.len();
    let wins = records.iter().filter(|r| r.rank == 1).count();
    let (average_score, average_accuracy) = if total == 0 {
        (0.0, 0.0)
    } else {
        let score_sum: f64 = records.iter().map(|r| f64::from(r.final_score)).sum();
        let accuracy_sum: f64 = records.iter().map(|r| r.accuracy).sum();
        (score_sum / total as f64, accuracy_sum / total as f64)
    };

    let trend = records
        .iter()
        .rev()
        .map(|r| TrendPoint {
            ended_at: format_system_time(r.ended_at),
            score: r.final_score,
            accuracy: r.accuracy,
        })
        .collect();

    PlayerStatsResponse {
        player_id,
        total_matches: total,
        wins,
        average_score,
        average_accuracy,
        trend,
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    fn completed(players: &[&str]) -> Session {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let mut session = Session::new(players[0].to_owned(), 6, start);
        for player in &players[1..] {
            session.join(player).unwrap();
        }
        session.start(vec!["q1".into()], start).unwrap();
        session
    }

    #[test]
    fn aggregation_matches_the_reference_snapshot() {
        let mut session = completed(&["p1", "p2"]);
        let at = session.created_at + Duration::from_millis(500);
        session.record_answer("q1", "p1", "a", true, at).unwrap();
        session.record_answer("q1", "p2", "b", false, at).unwrap();
        session
            .advance(session.created_at + Duration::from_secs(30))
            .unwrap();

        let records = aggregate(&session);
        assert_eq!(records.len(), 2);

        let p1 = &records[0];
        assert_eq!((p1.player_id.as_str(), p1.final_score, p1.accuracy), ("p1", 1, 1.0));
        assert_eq!(p1.rank, 1);
        assert_eq!(p1.duration_ms, 30_000);
        assert_eq!(p1.answers[0].time_ms, 500);

        let p2 = &records[1];
        assert_eq!((p2.player_id.as_str(), p2.final_score, p2.accuracy), ("p2", 0, 0.0));
        assert_eq!(p2.rank, 2);

        assert_eq!(aggregate(&session), records);
    }

    #[test]
    fn silent_players_get_zero_accuracy_and_shared_rank() {
        let mut session = completed(&["p1", "p2", "p3"]);
        session.advance(SystemTime::now()).unwrap();

        let records = aggregate(&session);
        assert!(records.iter().all(|r| r.accuracy == 0.0 && r.answers.is_empty()));
        assert!(records.iter().all(|r| r.rank == 1));
    }

    #[test]
    fn stats_count_wins_and_average() {
        let record = |score: u32, accuracy: f64, rank: u32| HistoryEntity {
            session_id: Uuid::new_v4(),
            player_id: "p1".into(),
            answers: Vec::new(),
            final_score: score,
            duration_ms: 0,
            accuracy,
            rank,
            ended_at: SystemTime::now(),
        };
        let stats = player_stats(
            "p1".into(),
            &[record(4, 1.0, 1), record(2, 0.5, 2), record(0, 0.0, 3)],
        );
        assert_eq!(stats.total_matches, 3);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.average_score, 2.0);
        assert_eq!(stats.average_accuracy, 0.5);
        assert_eq!(stats.trend.first().map(|p| p.score), Some(0));
    }

    #[test]
    fn stats_of_newcomer_are_zero() {
        let stats = player_stats("p1".into(), &[]);
        assert_eq!(stats.total_matches, 0);
        assert_eq!(stats.average_score, 0.0);
        assert!(stats.trend.is_empty());
    }
}
