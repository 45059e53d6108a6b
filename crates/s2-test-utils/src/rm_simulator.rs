//! A scripted resource manager: performs the S2 handshake against a CEM and
//! publishes a single-actuator FRBC battery model.
//!
//! Every message received from the CEM (other than `ReceptionStatus`) is
//! acknowledged with `ReceptionStatus OK`, since the emulated CEM sends
//! reliably and waits for acks.

use std::time::Duration;

use serde_json::{Value, json};
use uuid::Uuid;

use s2_protocol::S2_VERSION;

use crate::mock_peer::MockPeer;

pub struct RmSimulator {
    peer: MockPeer,
    pub rm_id: String,
    pub cem_id: String,
}

impl RmSimulator {
    /// Connect to an analyzer's inbound RM endpoint.
    pub async fn connect(
        base_url: &str,
        rm_id: &str,
        cem_id: &str,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let url = format!("{base_url}/backend/rm/{rm_id}/cem/{cem_id}/ws");
        Ok(Self {
            peer: MockPeer::connect(&url).await?,
            rm_id: rm_id.to_owned(),
            cem_id: cem_id.to_owned(),
        })
    }

    pub fn peer_mut(&mut self) -> &mut MockPeer {
        &mut self.peer
    }

    /// Receive until a message of `message_type` arrives, acking everything
    /// acknowledgeable on the way.  Returns None on timeout.
    pub async fn await_message_type(
        &mut self,
        message_type: &str,
        timeout: Duration,
    ) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())?;
            let message = self.peer.recv_json(remaining).await?;
            let received_type = message.get("message_type")?.as_str()?.to_owned();
            if received_type != "ReceptionStatus" {
                if let Some(message_id) = message.get("message_id").and_then(Value::as_str) {
                    let ack = json!({
                        "message_type": "ReceptionStatus",
                        "subject_message_id": message_id,
                        "status": "OK"
                    });
                    self.peer.send_json(&ack).await.ok()?;
                }
            }
            if received_type == message_type {
                return Some(message);
            }
        }
    }

    /// Send our handshake and wait for the CEM's `HandshakeResponse`.
    pub async fn run_handshake(
        &mut self,
        timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.peer
            .send_json(&json!({
                "message_type": "Handshake",
                "message_id": Uuid::new_v4().to_string(),
                "role": "RM",
                "supported_protocol_versions": [S2_VERSION]
            }))
            .await?;
        self.await_message_type("HandshakeResponse", timeout)
            .await
            .ok_or("no HandshakeResponse before timeout")?;
        Ok(())
    }

    /// Advertise FRBC and wait for the CEM to select it.
    pub async fn select_control_type(
        &mut self,
        timeout: Duration,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        self.peer
            .send_json(&json!({
                "message_type": "ResourceManagerDetails",
                "message_id": Uuid::new_v4().to_string(),
                "resource_id": self.rm_id,
                "available_control_types": ["FILL_RATE_BASED_CONTROL"]
            }))
            .await?;
        self.await_message_type("SelectControlType", timeout)
            .await
            .ok_or("no SelectControlType before timeout".into())
    }

    /// Publish a one-actuator battery: symmetric fill rates, storage range
    /// 0..100, a full-charge target profile, and the current fill level.
    pub async fn send_frbc_bootstrap(
        &mut self,
        present_fill_level: f64,
        target_fill_level: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let now = chrono::Utc::now();
        self.peer
            .send_json(&json!({
                "message_type": "FRBC.SystemDescription",
                "message_id": Uuid::new_v4().to_string(),
                "valid_from": now.to_rfc3339(),
                "actuators": [{
                    "id": "battery-1",
                    "operation_modes": [{
                        "id": "om0",
                        "elements": [{
                            "fill_level_range": {"start_of_range": 0.0, "end_of_range": 100.0},
                            "fill_rate": {"start_of_range": -5.33, "end_of_range": 5.33}
                        }]
                    }],
                    "transitions": [],
                    "timers": []
                }],
                "storage": {
                    "fill_level_range": {"start_of_range": 0.0, "end_of_range": 100.0}
                }
            }))
            .await?;
        self.peer
            .send_json(&json!({
                "message_type": "FRBC.ActuatorStatus",
                "message_id": Uuid::new_v4().to_string(),
                "actuator_id": "battery-1",
                "active_operation_mode_id": "om0",
                "operation_mode_factor": 0.5
            }))
            .await?;
        self.peer
            .send_json(&json!({
                "message_type": "FRBC.StorageStatus",
                "message_id": Uuid::new_v4().to_string(),
                "present_fill_level": present_fill_level
            }))
            .await?;
        self.peer
            .send_json(&json!({
                "message_type": "FRBC.FillLevelTargetProfile",
                "message_id": Uuid::new_v4().to_string(),
                "start_time": now.to_rfc3339(),
                "elements": [{
                    "duration": 3600,
                    "fill_level_range": {
                        "start_of_range": target_fill_level,
                        "end_of_range": target_fill_level
                    }
                }]
            }))
            .await?;
        Ok(())
    }

    /// Wait for the next `FRBC.Instruction` from the CEM.
    pub async fn await_instruction(&mut self, timeout: Duration) -> Option<Value> {
        self.await_message_type("FRBC.Instruction", timeout).await
    }

    pub async fn close(self) {
        self.peer.close().await;
    }
}
