//! Graceful shutdown: half-connections stop, the pipeline drains, and
//! processor close() takes the observer sockets down.

mod common;

use std::time::Duration;

use analyzer::pipeline::MessageType;
use common::start_server;
use s2_test_utils::MockPeer;
use serde_json::json;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn shutdown_drains_the_pipeline_and_closes_observers() {
    let server = start_server(None).await;

    let mut observer = MockPeer::connect(&format!("{}/backend/session-updates/", server.ws_url))
        .await
        .unwrap();
    let mut rm = MockPeer::connect(&format!("{}/backend/rm/R1/cem/C1/ws", server.ws_url))
        .await
        .unwrap();
    let mut cem = MockPeer::connect(&format!("{}/backend/cem/C1/rm/R1/ws", server.ws_url))
        .await
        .unwrap();

    rm.send_json(&json!({
        "message_type": "Handshake",
        "message_id": "h1",
        "role": "RM",
        "supported_protocol_versions": ["0.0.1-beta"]
    }))
    .await
    .unwrap();
    assert!(cem.recv_json(RECV_TIMEOUT).await.is_some());
    let open = observer.recv_json(RECV_TIMEOUT).await.expect("open snapshot");
    assert_eq!(open["state"], "open");

    server.state.router.shutdown().await;

    // Half-connections close from the analyzer side.
    assert!(rm.recv_json(RECV_TIMEOUT).await.is_none());
    assert!(cem.recv_json(RECV_TIMEOUT).await.is_none());

    // The teardown still reaches observers before their sockets go away.
    let closed = observer.recv_json(RECV_TIMEOUT).await.expect("closed snapshot");
    assert_eq!(closed["state"], "closed");
    assert_eq!(closed["session_id"], open["session_id"]);
    assert!(observer.recv_json(RECV_TIMEOUT).await.is_none());

    // The pipeline ran to completion, with everything persisted.
    server.pipeline_task.await.expect("pipeline task");
    let records = server
        .store
        .filtered(&analyzer::db::HistoryQuery::default())
        .unwrap();
    assert!(
        records
            .iter()
            .any(|r| r.message_type == MessageType::SessionEnded)
    );
}
