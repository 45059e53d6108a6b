//! The emulated CEM ("simple CEM").
//!
//! One actor task owns every [`DeviceModel`]; model half-connections feed
//! it envelopes and a periodic tick drives the control strategies.  Sends
//! happen on background tasks via the reception-status awaiter, so the
//! actor never parks on a slow RM.

pub mod device;
pub mod frbc;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use s2_protocol::{OriginType, S2Message};

use crate::awaiter::ReceptionStatusAwaiter;
use crate::envelope::Envelope;
use crate::router::{ConnectionKey, OUTBOUND_QUEUE_CAPACITY, PeerRegistration, RouterHandle};

pub use device::{DeviceModel, DeviceState, ModelSender};

/// A control strategy owned by a device model.  Only FRBC is implemented;
/// the trait is the seam the device model dispatches through.
pub trait ControlStrategy: Send {
    fn receive(&mut self, message: &S2Message);

    /// Compute the instructions for one timestep.
    fn tick(&mut self, timestep_start: DateTime<Utc>, timestep_end: DateTime<Utc>) -> Vec<Value>;
}

#[derive(Debug, Clone)]
pub struct CemConfig {
    pub model_id: String,
    pub tick_interval: std::time::Duration,
}

impl CemConfig {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            tick_interval: std::time::Duration::from_secs(60),
        }
    }
}

enum CemCommand {
    BindRm { rm_id: String },
    UnbindRm { rm_id: String },
    Deliver { rm_id: String, payload: Value },
}

/// Cloneable handle to the simple CEM task.
#[derive(Clone)]
pub struct CemHandle {
    pub model_id: String,
    tx: mpsc::Sender<CemCommand>,
}

impl CemHandle {
    /// Whether an inbound RM half-connection addresses this CEM.
    pub fn serves(&self, cem_id: &str) -> bool {
        self.model_id == cem_id
    }

    /// Create the device model and model half-connection for a new RM.
    pub async fn bind_rm(&self, rm_id: impl Into<String>) {
        let _ = self
            .tx
            .send(CemCommand::BindRm { rm_id: rm_id.into() })
            .await;
    }

    /// Tear down the device model when its RM goes away.
    pub async fn unbind_rm(&self, rm_id: impl Into<String>) {
        let _ = self
            .tx
            .send(CemCommand::UnbindRm { rm_id: rm_id.into() })
            .await;
    }
}

/// Spawn the simple CEM actor.
pub fn spawn_cem(config: CemConfig, router: RouterHandle) -> CemHandle {
    let (tx, rx) = mpsc::channel(256);
    let task = CemTask {
        config: config.clone(),
        router,
        models: HashMap::new(),
        self_tx: tx.clone(),
    };
    tokio::spawn(task.run(rx));
    CemHandle {
        model_id: config.model_id,
        tx,
    }
}

struct CemTask {
    config: CemConfig,
    router: RouterHandle,
    models: HashMap<String, DeviceModel>,
    self_tx: mpsc::Sender<CemCommand>,
}

impl CemTask {
    async fn run(mut self, mut rx: mpsc::Receiver<CemCommand>) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately; models only
        // appear afterwards, so that is harmless.
        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(CemCommand::BindRm { rm_id }) => self.bind_rm(rm_id).await,
                    Some(CemCommand::UnbindRm { rm_id }) => {
                        if self.models.remove(&rm_id).is_some() {
                            info!(cem = %self.config.model_id, rm = %rm_id, "device model removed");
                        }
                    }
                    Some(CemCommand::Deliver { rm_id, payload }) => self.deliver(&rm_id, payload),
                    None => break,
                },
                _ = ticker.tick() => self.tick_models(),
            }
        }
        info!(cem = %self.config.model_id, "simple CEM stopped");
    }

    async fn bind_rm(&mut self, rm_id: String) {
        if self.models.contains_key(&rm_id) {
            warn!(cem = %self.config.model_id, rm = %rm_id, "device model already exists");
            return;
        }

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(OUTBOUND_QUEUE_CAPACITY);
        let registration = PeerRegistration {
            origin_id: self.config.model_id.clone(),
            dest_id: rm_id.clone(),
            origin_type: OriginType::Cem,
            outbound: outbound_tx,
        };
        if self.router.register(registration).await.is_err() {
            error!(cem = %self.config.model_id, rm = %rm_id, "router rejected model connection");
            return;
        }

        // Drain the model half-connection into the actor's own queue.
        let self_tx = self.self_tx.clone();
        let drain_rm_id = rm_id.clone();
        tokio::spawn(async move {
            while let Some(envelope) = outbound_rx.recv().await {
                if self_tx
                    .send(CemCommand::Deliver {
                        rm_id: drain_rm_id.clone(),
                        payload: envelope.payload,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        let device_id = format!("{}->{}", self.config.model_id, rm_id);
        let awaiter = Arc::new(ReceptionStatusAwaiter::new());
        let sender = ModelSender::new(
            self.router.clone(),
            awaiter.clone(),
            ConnectionKey::new(self.config.model_id.clone(), rm_id.clone()),
            device_id.clone(),
        );
        let model = DeviceModel::new(device_id.clone(), rm_id.clone(), sender, awaiter);
        self.models.insert(rm_id.clone(), model);
        info!(cem = %self.config.model_id, rm = %rm_id, device = %device_id, "device model created");
    }

    fn deliver(&mut self, rm_id: &str, payload: Value) {
        let Some(model) = self.models.get_mut(rm_id) else {
            error!(
                cem = %self.config.model_id,
                rm = %rm_id,
                "received a message from an RM with no device model; dropping"
            );
            return;
        };

        let message_type = payload
            .get("message_type")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if message_type == "ReceptionStatus" {
            if let Err(e) = model.awaiter().receive(&payload) {
                warn!(cem = %self.config.model_id, rm = %rm_id, error = %e, "bad reception status");
            }
            return;
        }

        let Some(message_id) = payload.get("message_id").and_then(|v| v.as_str()) else {
            // Without a message id there is nothing to acknowledge against.
            warn!(
                cem = %self.config.model_id,
                rm = %rm_id,
                "payload carries no message_id; dropping without acknowledgement"
            );
            return;
        };

        model.sender().send_raw(json!({
            "message_type": "ReceptionStatus",
            "subject_message_id": message_id,
            "status": "OK"
        }));
        model.receive(&payload);
    }

    fn tick_models(&mut self) {
        let timestep_start = Utc::now();
        let timestep_end = timestep_start
            + chrono::Duration::from_std(self.config.tick_interval)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));
        for model in self.models.values_mut() {
            // Each instruction is sent concurrently; failures are logged by
            // the sender task.
            for instruction in model.tick(timestep_start, timestep_end) {
                model.sender().send(instruction);
            }
        }
    }
}
