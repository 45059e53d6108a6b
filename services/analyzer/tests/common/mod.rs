//! Shared scaffolding: an analyzer instance on an ephemeral port.
#![allow(dead_code)]

use analyzer::cem::CemConfig;
use analyzer::db::Store;

pub struct TestServer {
    pub ws_url: String,
    pub http_url: String,
    pub store: Store,
    pub state: analyzer::AppState,
    pub pipeline_task: tokio::task::JoinHandle<()>,
}

pub async fn start_server(cem: Option<CemConfig>) -> TestServer {
    let store = Store::open_in_memory().expect("in-memory store");
    let app = analyzer::build_app(store.clone(), cem);
    let state = app.state.clone();
    let router = analyzer::build_router(app.state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    TestServer {
        ws_url: format!("ws://{addr}"),
        http_url: format!("http://{addr}"),
        store,
        state,
        pipeline_task: app.pipeline_task,
    }
}

/// Poll until `predicate` returns Some, or panic after ~5 seconds.
pub async fn eventually<T>(mut predicate: impl FnMut() -> Option<T>, what: &str) -> T {
    for _ in 0..100 {
        if let Some(value) = predicate() {
            return value;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}
