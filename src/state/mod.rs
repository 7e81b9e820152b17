pub mod session;
mod sse;
pub mod state_machine;
pub mod transitions;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::{
        question_source::{QuestionSource, memory::InMemoryQuestionBank},
        session_store::SessionStore,
    },
    error::ServiceError,
};

pub use self::sse::{PublishError, SseHub, StatePublisher};

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Central application state holding the storage handles, the broadcast hub and the config.
pub struct AppState {
    config: AppConfig,
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    question_source: RwLock<Arc<dyn QuestionSource>>,
    sse: Arc<SseHub>,
    publisher: Arc<dyn StatePublisher>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// Questions come from the configured bank until another source is installed. The
    /// application starts in degraded mode until a session store is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let sse = Arc::new(SseHub::new(config.sse_capacity));
        let publisher: Arc<dyn StatePublisher> = sse.clone();
        Self::build(config, sse, publisher)
    }

    /// Same as [`AppState::new`] but routes session notifications through `publisher`.
    pub fn with_publisher(config: AppConfig, publisher: Arc<dyn StatePublisher>) -> SharedState {
        let sse = Arc::new(SseHub::new(config.sse_capacity));
        Self::build(config, sse, publisher)
    }

    fn build(
        config: AppConfig,
        sse: Arc<SseHub>,
        publisher: Arc<dyn StatePublisher>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let bank: Arc<dyn QuestionSource> =
            Arc::new(InMemoryQuestionBank::new(config.questions.clone()));
        Arc::new(Self {
            config,
            session_store: RwLock::new(None),
            question_source: RwLock::new(bank),
            sse,
            publisher,
            degraded: degraded_tx,
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Session store to run an operation against, or [`ServiceError::Degraded`].
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn set_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Current question source.
    pub async fn question_source(&self) -> Arc<dyn QuestionSource> {
        let guard = self.question_source.read().await;
        guard.clone()
    }

    /// Replace the question source.
    pub async fn set_question_source(&self, source: Arc<dyn QuestionSource>) {
        let mut guard = self.question_source.write().await;
        *guard = source;
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Broadcast hub feeding the SSE streams.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Sink for session change notifications.
    pub fn publisher(&self) -> &dyn StatePublisher {
        self.publisher.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::session_store::memory::MemorySessionStore;

    #[tokio::test]
    async fn starts_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_session_store().await,
            Err(ServiceError::Degraded)
        ));

        state
            .set_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        assert!(!state.is_degraded());
        assert!(state.require_session_store().await.is_ok());
    }

    #[tokio::test]
    async fn degraded_watcher_sees_changes_once() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        state.update_degraded(false);
        watcher.changed().await.unwrap();
        assert!(!*watcher.borrow_and_update());

        state.update_degraded(false);
        assert!(!watcher.has_changed().unwrap());
    }
}
