//! Application-level configuration loading: gameplay limits, store retry policy and the
//! built-in question bank.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::models::QuestionEntity;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "FRENZY_BACK_CONFIG_PATH";

const DEFAULT_MAX_PLAYERS: usize = 6;
const DEFAULT_QUESTIONS_PER_SESSION: usize = 10;
const DEFAULT_SSE_CAPACITY: usize = 64;

/// Retry and timeout policy applied to every conditional store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorePolicy {
    /// Attempts before a contended write gives up.
    pub max_attempts: u32,
    /// Backoff before the first retry.
    pub base_backoff: Duration,
    /// Upper bound of a single backoff.
    pub max_backoff: Duration,
    /// Deadline of a single store call.
    pub operation_timeout: Duration,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(200),
            operation_timeout: Duration::from_millis(2_000),
        }
    }
}

impl StorePolicy {
    /// Backoff ceiling before retry number `attempt` (1-based), doubling up to `max_backoff`.
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Lobby capacity used when a create request does not specify one.
    pub max_players: usize,
    /// Number of questions dealt when a session starts.
    pub questions_per_session: usize,
    /// Conditional-write retry policy.
    pub store: StorePolicy,
    /// Buffer size of the SSE broadcast channel.
    pub sse_capacity: usize,
    /// Seed bank for the in-memory question source.
    pub questions: Vec<QuestionEntity>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        questions = app_config.questions.len(),
                        max_players = app_config.max_players,
                        "loaded application config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a configuration document. Missing keys take their default value.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    max_players: Option<usize>,
    questions_per_session: Option<usize>,
    sse_capacity: Option<usize>,
    store: RawStorePolicy,
    questions: Option<Vec<RawQuestion>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStorePolicy {
    max_attempts: Option<u32>,
    base_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
    operation_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
/// JSON representation of a single question entry.
struct RawQuestion {
    id: String,
    question: String,
    answer: String,
    #[serde(default)]
    category: Option<String>,
}

impl From<RawQuestion> for QuestionEntity {
    fn from(value: RawQuestion) -> Self {
        Self {
            id: value.id,
            prompt: value.question,
            expected_answer: value.answer,
            category: value.category,
        }
    }
}

impl From<RawStorePolicy> for StorePolicy {
    fn from(value: RawStorePolicy) -> Self {
        let defaults = StorePolicy::default();
        Self {
            max_attempts: value.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            base_backoff: value
                .base_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_backoff),
            max_backoff: value
                .max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_backoff),
            operation_timeout: value
                .operation_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.operation_timeout),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let questions = match value.questions {
            Some(questions) => questions.into_iter().map(Into::into).collect(),
            None => default_questions(),
        };
        Self {
            max_players: value.max_players.unwrap_or(DEFAULT_MAX_PLAYERS).max(1),
            questions_per_session: value
                .questions_per_session
                .unwrap_or(DEFAULT_QUESTIONS_PER_SESSION)
                .max(1),
            store: value.store.into(),
            sse_capacity: value.sse_capacity.unwrap_or(DEFAULT_SSE_CAPACITY).max(1),
            questions,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in question bank shipped with the binary.
fn default_questions() -> Vec<QuestionEntity> {
    [
        ("geo-1", "What is the capital of France?", "Paris", "geography"),
        ("geo-2", "What is the largest ocean on Earth?", "Pacific", "geography"),
        ("geo-3", "On which continent is Kenya?", "Africa", "geography"),
        ("sci-1", "What is the chemical symbol for gold?", "Au", "science"),
        ("sci-2", "How many planets are in the Solar System?", "8", "science"),
        ("sci-3", "What gas do plants absorb from the air?", "Carbon dioxide", "science"),
        ("math-1", "What is 7 times 8?", "56", "math"),
        ("math-2", "What is the square root of 144?", "12", "math"),
        ("hist-1", "In which year did World War II end?", "1945", "history"),
        ("hist-2", "Who was the first person to walk on the Moon?", "Neil Armstrong", "history"),
        ("lit-1", "Who wrote Romeo and Juliet?", "William Shakespeare", "literature"),
        ("tech-1", "What does CPU stand for?", "Central Processing Unit", "technology"),
    ]
    .into_iter()
    .map(|(id, prompt, answer, category)| QuestionEntity {
        id: id.to_owned(),
        prompt: prompt.to_owned(),
        expected_answer: answer.to_owned(),
        category: Some(category.to_owned()),
    })
    .collect()
}
