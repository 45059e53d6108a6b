//! REST/WS surface of the analyzer.

pub mod debugger;
pub mod history;
pub mod inject;
pub mod peers;
pub mod response;

use axum::{
    Json, Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::cem::{CemConfig, CemHandle, spawn_cem};
use crate::db::Store;
use crate::processors;
use crate::processors::debugger::{DebuggerRegistry, new_registry};
use crate::processors::session::{
    SessionObserverRegistry, SharedSessions, new_observer_registry, new_shared_sessions,
};
use crate::router::RouterHandle;

#[derive(Clone)]
pub struct AppState {
    pub router: RouterHandle,
    pub store: Store,
    pub debugger_observers: DebuggerRegistry,
    pub session_observers: SessionObserverRegistry,
    pub open_sessions: SharedSessions,
    pub cem: Option<CemHandle>,
}

/// Everything a running analyzer consists of, minus the HTTP listener.
///
/// `pipeline_task` must be awaited at shutdown: it completes once
/// [`RouterHandle::shutdown`](crate::router::RouterHandle::shutdown) has
/// run, the queue has drained, and every processor's `close()` has
/// finished (closing observer sockets).
pub struct App {
    pub state: AppState,
    pub pipeline_task: tokio::task::JoinHandle<()>,
}

/// Wire up pipeline, router, and (optionally) the simple CEM.
///
/// The router task holds the only `PipelineHandle`, so stopping the router
/// is what lets the pipeline drain and close.
pub fn build_app(store: Store, cem: Option<CemConfig>) -> App {
    let debugger_observers = new_registry();
    let session_observers = new_observer_registry();
    let open_sessions = new_shared_sessions();

    let (pipeline, pipeline_task) = processors::standard_pipeline(
        store.clone(),
        debugger_observers.clone(),
        session_observers.clone(),
        open_sessions.clone(),
    )
    .spawn();

    let router = crate::router::spawn_router(pipeline);
    let cem = cem.map(|config| spawn_cem(config, router.clone()));

    App {
        state: AppState {
            router,
            store,
            debugger_observers,
            session_observers,
            open_sessions,
            cem,
        },
        pipeline_task,
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/backend/rm/{rm_id}/cem/{cem_id}/ws", get(peers::rm_ws_handler))
        .route("/backend/cem/{cem_id}/rm/{rm_id}/ws", get(peers::cem_ws_handler))
        .route("/backend/debugger/", get(debugger::debugger_ws_handler))
        .route(
            "/backend/session-updates/",
            get(debugger::session_updates_ws_handler),
        )
        .route("/backend/inject/", post(inject::inject_message))
        .route(
            "/backend/connections/",
            post(peers::dial_connections).get(history::list_sessions),
        )
        .route("/backend/history-filter/", get(history::get_filtered_history))
        .route("/backend/validate-message/", post(inject::validate_message))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy"}))
}
