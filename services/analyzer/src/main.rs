use analyzer::cem::CemConfig;
use analyzer::config::{Config, sqlite_path};
use analyzer::db::Store;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .init();

    // Database unavailability at startup is the one fatal error.
    let db_path = sqlite_path(&config.database_url);
    let store = Store::open(&db_path).expect("failed to open database");
    info!(path = %db_path.display(), "database ready");

    let cem = config.cem_model_id.clone().map(CemConfig::new);
    if let Some(cem) = &cem {
        info!(model_id = %cem.model_id, "simple CEM enabled");
    }

    let app = analyzer::build_app(store, cem);
    let pipeline_task = app.pipeline_task;
    let shutdown_router = app.state.router.clone();
    let router = analyzer::build_router(app.state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %config.bind_addr, "analyzer listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Stop every half-connection and the router task.  With the
            // router's pipeline handle gone the pipeline drains its queue
            // and closes its processors, which closes observer sockets, so
            // the in-flight websocket handlers all wind down.
            shutdown_router.shutdown().await;
        })
        .await
        .expect("server error");

    // Wait for the pipeline to finish whatever was still queued and run
    // every processor's close().
    if let Err(e) = pipeline_task.await {
        warn!(error = %e, "pipeline task ended abnormally");
    }
    info!("analyzer shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
