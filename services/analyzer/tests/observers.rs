//! Debugger and session-update observer streams.

mod common;

use std::time::Duration;

use common::start_server;
use s2_test_utils::MockPeer;
use serde_json::json;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn observers_answer_ping_with_pong() {
    let server = start_server(None).await;
    let mut observer = MockPeer::connect(&format!("{}/backend/debugger/", server.ws_url))
        .await
        .unwrap();
    observer.send_text("ping").await.unwrap();
    assert_eq!(observer.recv_text(RECV_TIMEOUT).await.as_deref(), Some("pong"));
}

#[tokio::test]
async fn invalid_messages_are_forwarded_and_annotated_for_observers() {
    let server = start_server(None).await;
    let mut observer = MockPeer::connect(&format!("{}/backend/debugger/", server.ws_url))
        .await
        .unwrap();
    let mut rm = MockPeer::connect(&format!("{}/backend/rm/R1/cem/C1/ws", server.ws_url))
        .await
        .unwrap();
    let mut cem = MockPeer::connect(&format!("{}/backend/cem/C1/rm/R1/ws", server.ws_url))
        .await
        .unwrap();

    // FRBC.ActuatorStatus missing its required active_operation_mode_id.
    let invalid = json!({
        "message_type": "FRBC.ActuatorStatus",
        "message_id": "x",
        "operation_mode_factor": 0.5,
        "previous_operation_mode_id": "4321"
    });
    rm.send_json(&invalid).await.unwrap();

    // Forwarded as-is despite failing validation.
    assert_eq!(cem.recv_json(RECV_TIMEOUT).await.unwrap(), invalid);

    // The observer stream carries the annotation.
    let observed = loop {
        let message = observer.recv_json(RECV_TIMEOUT).await.expect("observer frame");
        if message["message_type"] == "S2" {
            break message;
        }
    };
    assert_eq!(observed["s2_msg_type"], "FRBC.ActuatorStatus");
    let errors = observed["s2_validation_error"]["errors"]
        .as_array()
        .expect("validation errors");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["type"], "missing");

    // And persistence grew one child validation-error row.
    let store = server.store.clone();
    let record = common::eventually(
        || {
            store
                .filtered(&analyzer::db::HistoryQuery {
                    s2_msg_type: Some("FRBC.ActuatorStatus".to_owned()),
                    ..analyzer::db::HistoryQuery::default()
                })
                .unwrap()
                .into_iter()
                .next()
        },
        "persisted invalid message",
    )
    .await;
    assert_eq!(record.validation_errors.len(), 1);
}

#[tokio::test]
async fn debugger_filter_restricts_the_stream_to_matching_peers() {
    let server = start_server(None).await;
    let mut observer = MockPeer::connect(&format!(
        "{}/backend/debugger/?rm_id=R1&cem_id=&session_id=",
        server.ws_url
    ))
    .await
    .unwrap();

    let mut rm_other = MockPeer::connect(&format!("{}/backend/rm/R2/cem/C2/ws", server.ws_url))
        .await
        .unwrap();
    let mut rm_match = MockPeer::connect(&format!("{}/backend/rm/R1/cem/C1/ws", server.ws_url))
        .await
        .unwrap();

    rm_other
        .send_json(&json!({"message_type": "PowerMeasurement", "message_id": "other"}))
        .await
        .unwrap();
    rm_match
        .send_json(&json!({"message_type": "PowerMeasurement", "message_id": "match"}))
        .await
        .unwrap();

    let observed = observer.recv_json(RECV_TIMEOUT).await.expect("observer frame");
    assert_eq!(observed["rm_id"], "R1");
    assert_eq!(observed["msg"]["message_id"], "match");
}

#[tokio::test]
async fn session_updates_stream_sees_open_then_closed() {
    let server = start_server(None).await;
    let mut observer = MockPeer::connect(&format!("{}/backend/session-updates/", server.ws_url))
        .await
        .unwrap();

    let rm = MockPeer::connect(&format!("{}/backend/rm/R1/cem/C1/ws", server.ws_url))
        .await
        .unwrap();
    let _cem = MockPeer::connect(&format!("{}/backend/cem/C1/rm/R1/ws", server.ws_url))
        .await
        .unwrap();

    let open = observer.recv_json(RECV_TIMEOUT).await.expect("open snapshot");
    assert_eq!(open["state"], "open");
    assert_eq!(open["cem_id"], "C1");
    assert_eq!(open["rm_id"], "R1");
    assert!(open.get("end_timestamp").is_none());

    rm.close().await;

    let closed = observer.recv_json(RECV_TIMEOUT).await.expect("closed snapshot");
    assert_eq!(closed["state"], "closed");
    assert_eq!(closed["session_id"], open["session_id"]);
    assert!(closed.get("end_timestamp").is_some());
}

#[tokio::test]
async fn late_session_update_subscribers_get_open_sessions() {
    let server = start_server(None).await;

    let _rm = MockPeer::connect(&format!("{}/backend/rm/R1/cem/C1/ws", server.ws_url))
        .await
        .unwrap();
    let _cem = MockPeer::connect(&format!("{}/backend/cem/C1/rm/R1/ws", server.ws_url))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut observer = MockPeer::connect(&format!("{}/backend/session-updates/", server.ws_url))
        .await
        .unwrap();
    let snapshot = observer.recv_json(RECV_TIMEOUT).await.expect("open session");
    assert_eq!(snapshot["state"], "open");
}

#[tokio::test]
async fn history_replay_precedes_the_live_stream() {
    let server = start_server(None).await;
    let mut rm = MockPeer::connect(&format!("{}/backend/rm/R1/cem/C1/ws", server.ws_url))
        .await
        .unwrap();
    let mut cem = MockPeer::connect(&format!("{}/backend/cem/C1/rm/R1/ws", server.ws_url))
        .await
        .unwrap();

    rm.send_json(&json!({"message_type": "PowerMeasurement", "message_id": "early"}))
        .await
        .unwrap();
    assert!(cem.recv_json(RECV_TIMEOUT).await.is_some());

    // Wait until the early message is persisted, then find its session id.
    let store = server.store.clone();
    let record = common::eventually(
        || {
            store
                .filtered(&analyzer::db::HistoryQuery {
                    s2_msg_type: Some("PowerMeasurement".to_owned()),
                    ..analyzer::db::HistoryQuery::default()
                })
                .unwrap()
                .into_iter()
                .next()
        },
        "persisted early message",
    )
    .await;

    let mut observer = MockPeer::connect(&format!(
        "{}/backend/debugger/?session_id={}&include_session_history=true",
        server.ws_url, record.session_id
    ))
    .await
    .unwrap();

    // Replay: SESSION_STARTED then the early S2 message, before anything
    // sent after subscribing.
    let replayed_started = observer.recv_json(RECV_TIMEOUT).await.expect("replayed start");
    assert_eq!(replayed_started["message_type"], "SESSION_STARTED");

    // Traffic racing the replay window: sent while the replay may still be
    // streaming.  It must arrive after the replayed records, exactly once.
    rm.send_json(&json!({"message_type": "PowerMeasurement", "message_id": "during"}))
        .await
        .unwrap();

    let replayed = observer.recv_json(RECV_TIMEOUT).await.expect("replayed message");
    assert_eq!(replayed["msg"]["message_id"], "early");
    let live = observer.recv_json(RECV_TIMEOUT).await.expect("racing message");
    assert_eq!(live["msg"]["message_id"], "during");

    // No duplicate of anything replayed or spliced in.
    assert!(observer.recv_json(Duration::from_millis(500)).await.is_none());
}
