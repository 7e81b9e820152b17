//! Frenzy Back binary entrypoint wiring REST, SSE and the session store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use frenzy_back::{
    config::AppConfig,
    dao::session_store::memory::MemorySessionStore,
    routes,
    services::sse_service,
    state::{AppState, SharedState},
};
#[cfg(any(feature = "mongo-store", feature = "couch-store"))]
use frenzy_back::{
    dao::{session_store::SessionStore, storage::StorageError},
    services::storage_supervisor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    sse_service::spawn_degraded_broadcaster(app_state.clone());
    spawn_storage(app_state.clone()).await?;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the backend named by `STORAGE_BACKEND` (`mongo`, `couch` or `memory`).
///
/// Remote backends are connected by the storage supervisor so the server starts in
/// degraded mode and recovers once the database is reachable.
async fn spawn_storage(state: SharedState) -> anyhow::Result<()> {
    let backend = env::var("STORAGE_BACKEND").unwrap_or_else(|_| "mongo".into());
    match backend.as_str() {
        "memory" => {
            warn!("using the in-memory session store; sessions are lost on restart");
            state
                .set_session_store(Arc::new(MemorySessionStore::new()))
                .await;
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use frenzy_back::dao::session_store::mongodb::{MongoConfig, MongoSessionStore};

            let connect_state = state.clone();
            tokio::spawn(storage_supervisor::run(state, move || {
                let state = connect_state.clone();
                async move {
                    let config = MongoConfig::from_env().await?;
                    let store = MongoSessionStore::connect(config).await?;
                    state.set_question_source(Arc::new(store.questions())).await;
                    Ok::<Arc<dyn SessionStore>, StorageError>(Arc::new(store))
                }
            }));
        }
        #[cfg(feature = "couch-store")]
        "couch" => {
            use frenzy_back::dao::session_store::couchdb::{CouchConfig, CouchSessionStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = CouchConfig::from_env()?;
                let store = CouchSessionStore::connect(config).await?;
                Ok::<Arc<dyn SessionStore>, StorageError>(Arc::new(store))
            }));
        }
        other => anyhow::bail!("unsupported STORAGE_BACKEND `{other}`"),
    }
    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
