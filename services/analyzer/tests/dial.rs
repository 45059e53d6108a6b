//! Outbound dialing: the analyzer initiates the websocket to a peer.

mod common;

use std::time::Duration;

use common::start_server;
use s2_test_utils::{MockPeer, MockPeerServer};
use serde_json::json;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn dialing_an_rm_bridges_it_to_an_inbound_cem() {
    let server = start_server(None).await;
    let client = reqwest::Client::new();

    let mut remote_rm = MockPeerServer::start().await.unwrap();
    let mut cem = MockPeer::connect(&format!("{}/backend/cem/C1/rm/R1/ws", server.ws_url))
        .await
        .unwrap();

    let response = client
        .post(format!("{}/backend/connections/", server.http_url))
        .json(&json!({
            "rm_id": "R1",
            "cem_id": "C1",
            "rm_uri": remote_rm.url()
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let dialed: Vec<serde_json::Value> = response.json().await.unwrap();
    assert_eq!(dialed.len(), 1);
    assert_eq!(dialed[0]["origin_type"], "RM");

    let mut rm_conn = remote_rm
        .accept(RECV_TIMEOUT)
        .await
        .expect("analyzer dialed in");

    // RM -> analyzer -> CEM.
    let handshake = json!({
        "message_type": "Handshake",
        "message_id": "h1",
        "role": "RM",
        "supported_protocol_versions": ["0.0.1-beta"]
    });
    rm_conn.send_json(&handshake).await.unwrap();
    assert_eq!(cem.recv_json(RECV_TIMEOUT).await.unwrap(), handshake);

    // And back: CEM -> analyzer -> RM.
    let response_msg = json!({
        "message_type": "HandshakeResponse",
        "message_id": "h2",
        "selected_protocol_version": "0.0.1-beta"
    });
    cem.send_json(&response_msg).await.unwrap();
    assert_eq!(rm_conn.recv_json(RECV_TIMEOUT).await.unwrap(), response_msg);
}

#[tokio::test]
async fn dialing_requires_at_least_one_uri() {
    let server = start_server(None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/backend/connections/", server.http_url))
        .json(&json!({"rm_id": "R1", "cem_id": "C1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn an_unreachable_peer_reports_upstream_error() {
    let server = start_server(None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/backend/connections/", server.http_url))
        .json(&json!({
            "rm_id": "R1",
            "cem_id": "C1",
            "rm_uri": "ws://127.0.0.1:1/ws"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "UPSTREAM_ERROR");
}
