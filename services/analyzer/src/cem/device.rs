//! Per-RM device model: the handshake / control-type-selection state
//! machine in front of the control strategy.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use s2_protocol::{
    ControlType, Handshake, PowerForecast, PowerMeasurement, ResourceManagerDetails, S2Message,
    S2_VERSION, SUPPORTED_CONTROL_TYPES, parse_message,
};

use crate::awaiter::ReceptionStatusAwaiter;
use crate::router::{ConnectionKey, RouterHandle};

use super::{ControlStrategy, frbc::FrbcStrategy};

/// States only ever advance left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceState {
    HandShake,
    SelectingControlType,
    SelectedControlType,
}

/// Sends messages from the model half-connection, each awaiting its
/// `ReceptionStatus` before the next one in the same batch goes out.
#[derive(Clone)]
pub struct ModelSender {
    router: RouterHandle,
    awaiter: Arc<ReceptionStatusAwaiter>,
    key: ConnectionKey,
    device_id: String,
}

impl ModelSender {
    pub fn new(
        router: RouterHandle,
        awaiter: Arc<ReceptionStatusAwaiter>,
        key: ConnectionKey,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            router,
            awaiter,
            key,
            device_id: device_id.into(),
        }
    }

    /// Send `payloads` in order on a background task; each one is
    /// acknowledged before its successor is routed.
    pub fn send_sequence(&self, payloads: Vec<Value>) {
        let router = self.router.clone();
        let awaiter = self.awaiter.clone();
        let key = self.key.clone();
        let device_id = self.device_id.clone();
        tokio::spawn(async move {
            for payload in payloads {
                if let Err(e) = awaiter.send_and_await(&router, key.clone(), payload, true).await {
                    warn!(device = %device_id, error = %e, "reliable send failed");
                    return;
                }
            }
        });
    }

    pub fn send(&self, payload: Value) {
        self.send_sequence(vec![payload]);
    }

    /// Route without awaiting an acknowledgement.  ReceptionStatus replies
    /// get no status of their own.
    pub fn send_raw(&self, payload: Value) {
        let router = self.router.clone();
        let key = self.key.clone();
        tokio::spawn(async move {
            let _ = router.route_s2(key, payload).await;
        });
    }
}

pub struct DeviceModel {
    pub id: String,
    rm_id: String,
    state: DeviceState,
    selected_control_type: Option<ControlType>,
    strategy: Option<Box<dyn ControlStrategy>>,
    sender: ModelSender,
    awaiter: Arc<ReceptionStatusAwaiter>,

    handshake_received: Option<Handshake>,
    handshake_sent: Option<Value>,
    handshake_response_sent: Option<Value>,
    resource_manager_details: Option<ResourceManagerDetails>,
    power_measurements: Vec<PowerMeasurement>,
    power_forecasts: Vec<PowerForecast>,
}

impl DeviceModel {
    pub fn new(
        id: impl Into<String>,
        rm_id: impl Into<String>,
        sender: ModelSender,
        awaiter: Arc<ReceptionStatusAwaiter>,
    ) -> Self {
        Self {
            id: id.into(),
            rm_id: rm_id.into(),
            state: DeviceState::HandShake,
            selected_control_type: None,
            strategy: None,
            sender,
            awaiter,
            handshake_received: None,
            handshake_sent: None,
            handshake_response_sent: None,
            resource_manager_details: None,
            power_measurements: Vec::new(),
            power_forecasts: Vec::new(),
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn selected_control_type(&self) -> Option<ControlType> {
        self.selected_control_type
    }

    pub fn awaiter(&self) -> &Arc<ReceptionStatusAwaiter> {
        &self.awaiter
    }

    /// Handle a payload already acknowledged by the CEM front-end.
    pub fn receive(&mut self, payload: &Value) {
        let typed = match parse_message(payload) {
            Ok(typed) => typed,
            Err(details) => {
                warn!(
                    device = %self.id,
                    rm = %self.rm_id,
                    error = %details.msg,
                    "ignoring message the device model cannot parse"
                );
                return;
            }
        };

        match &typed {
            S2Message::Handshake(handshake) => self.handle_handshake(handshake.clone()),
            S2Message::ResourceManagerDetails(details) => {
                self.handle_resource_manager_details(details.clone());
            }
            S2Message::PowerForecast(forecast) => self.power_forecasts.push(forecast.clone()),
            S2Message::PowerMeasurement(measurement) => {
                self.power_measurements.push(measurement.clone());
            }
            other => match &mut self.strategy {
                Some(strategy) => strategy.receive(other),
                None => warn!(
                    device = %self.id,
                    rm = %self.rm_id,
                    message_type = other.type_name(),
                    "no control strategy selected yet; ignoring message"
                ),
            },
        }
    }

    fn handle_handshake(&mut self, handshake: Handshake) {
        let versions = handshake
            .supported_protocol_versions
            .clone()
            .unwrap_or_default();
        self.handshake_received = Some(handshake);

        if self.state != DeviceState::HandShake {
            warn!(device = %self.id, "handshake received after handshake phase; ignoring");
            return;
        }
        if !versions.iter().any(|v| v == S2_VERSION) {
            warn!(
                device = %self.id,
                rm = %self.rm_id,
                "RM supports none of our protocol versions; staying in handshake"
            );
            return;
        }

        let handshake_out = json!({
            "message_type": "Handshake",
            "message_id": Uuid::new_v4().to_string(),
            "role": "CEM",
            "supported_protocol_versions": [S2_VERSION]
        });
        let response_out = json!({
            "message_type": "HandshakeResponse",
            "message_id": Uuid::new_v4().to_string(),
            "selected_protocol_version": S2_VERSION
        });
        self.handshake_sent = Some(handshake_out.clone());
        self.handshake_response_sent = Some(response_out.clone());
        self.sender
            .send_sequence(vec![handshake_out, response_out]);
        self.state = DeviceState::SelectingControlType;
    }

    fn handle_resource_manager_details(&mut self, details: ResourceManagerDetails) {
        let available = details.available_control_types.clone();
        self.resource_manager_details = Some(details);

        if self.state != DeviceState::SelectingControlType {
            warn!(device = %self.id, "ResourceManagerDetails outside selection phase; ignoring");
            return;
        }

        let selected = SUPPORTED_CONTROL_TYPES
            .iter()
            .copied()
            .find(|ct| available.iter().any(|a| a == ct.wire_name()));
        let Some(selected) = selected else {
            warn!(
                device = %self.id,
                rm = %self.rm_id,
                "RM offers no control type we support; not selecting"
            );
            return;
        };

        self.sender.send(json!({
            "message_type": "SelectControlType",
            "message_id": Uuid::new_v4().to_string(),
            "control_type": selected.wire_name()
        }));
        self.state = DeviceState::SelectedControlType;
        self.selected_control_type = Some(selected);
        if selected == ControlType::Frbc {
            self.strategy = Some(Box::new(FrbcStrategy::new(self.id.clone())));
        }
        info!(device = %self.id, control_type = selected.wire_name(), "control type selected");
    }

    /// Advance the control strategy; returns the instructions to send.
    pub fn tick(
        &mut self,
        timestep_start: chrono::DateTime<chrono::Utc>,
        timestep_end: chrono::DateTime<chrono::Utc>,
    ) -> Vec<Value> {
        match &mut self.strategy {
            Some(strategy) => strategy.tick(timestep_start, timestep_end),
            None => Vec::new(),
        }
    }

    pub fn sender(&self) -> &ModelSender {
        &self.sender
    }
}
