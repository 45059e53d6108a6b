//! Session router: pairs half-connections and forwards envelopes.
//!
//! The router is an actor.  All access to the connection and buffer maps
//! happens on its own task; other components talk to it through a cloneable
//! [`RouterHandle`].  Envelopes from one origin are therefore never
//! reordered, and buffered envelopes drain before anything routed later.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

use s2_protocol::OriginType;

use crate::envelope::Envelope;
use crate::pipeline::{Message, MessageType, PipelineHandle};

/// Envelopes a writer task will accept before routing backpressures.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// Cap per buffered direction; beyond it the oldest envelope is dropped.
pub const MAX_BUFFERED_ENVELOPES: usize = 10_000;

/// `(origin_id, dest_id)` of one half-connection.  The partner half is the
/// reversed key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub origin_id: String,
    pub dest_id: String,
}

impl ConnectionKey {
    pub fn new(origin_id: impl Into<String>, dest_id: impl Into<String>) -> Self {
        Self {
            origin_id: origin_id.into(),
            dest_id: dest_id.into(),
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            origin_id: self.dest_id.clone(),
            dest_id: self.origin_id.clone(),
        }
    }
}

impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}", self.origin_id, self.dest_id)
    }
}

/// What a half-connection hands the router when it comes up.
#[derive(Debug)]
pub struct PeerRegistration {
    pub origin_id: String,
    pub dest_id: String,
    pub origin_type: OriginType,
    pub outbound: mpsc::Sender<Envelope>,
}

impl PeerRegistration {
    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new(self.origin_id.clone(), self.dest_id.clone())
    }

    pub fn cem_id(&self) -> &str {
        if self.origin_type.is_cem() {
            &self.origin_id
        } else {
            &self.dest_id
        }
    }

    pub fn rm_id(&self) -> &str {
        if self.origin_type.is_cem() {
            &self.dest_id
        } else {
            &self.origin_id
        }
    }
}

/// A live half-connection as seen by diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionDetails {
    pub origin_id: String,
    pub dest_id: String,
    pub origin_type: OriginType,
    pub session_id: Uuid,
}

#[derive(Debug, Error)]
pub enum RouterError {
    /// Inject targeting an origin half that is not connected.
    #[error("no connection registered for {0}->{1}")]
    NoConnection(String, String),
    /// The router task is gone (shutdown).
    #[error("router unavailable")]
    Unavailable,
}

enum RouterCommand {
    Register {
        peer: PeerRegistration,
        reply: oneshot::Sender<Uuid>,
    },
    RouteS2 {
        origin: ConnectionKey,
        payload: serde_json::Value,
    },
    Inject {
        origin_id: String,
        dest_id: String,
        payload: serde_json::Value,
        reply: oneshot::Sender<Result<(), RouterError>>,
    },
    ConnectionClosed {
        key: ConnectionKey,
    },
    ListConnections {
        reply: oneshot::Sender<Vec<ConnectionDetails>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to the router task.
#[derive(Clone)]
pub struct RouterHandle {
    tx: mpsc::Sender<RouterCommand>,
}

impl RouterHandle {
    /// Register a half-connection and return its session id.
    pub async fn register(&self, peer: PeerRegistration) -> Result<Uuid, RouterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RouterCommand::Register { peer, reply })
            .await
            .map_err(|_| RouterError::Unavailable)?;
        rx.await.map_err(|_| RouterError::Unavailable)
    }

    /// Route a payload received on `origin` toward its partner.
    pub async fn route_s2(
        &self,
        origin: ConnectionKey,
        payload: serde_json::Value,
    ) -> Result<(), RouterError> {
        self.tx
            .send(RouterCommand::RouteS2 { origin, payload })
            .await
            .map_err(|_| RouterError::Unavailable)
    }

    /// Originate `payload` as if it had arrived on the `(origin_id, dest_id)`
    /// half, which must be connected.
    pub async fn inject(
        &self,
        origin_id: impl Into<String>,
        dest_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<(), RouterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RouterCommand::Inject {
                origin_id: origin_id.into(),
                dest_id: dest_id.into(),
                payload,
                reply,
            })
            .await
            .map_err(|_| RouterError::Unavailable)?;
        rx.await.map_err(|_| RouterError::Unavailable)?
    }

    pub async fn connection_closed(&self, key: ConnectionKey) {
        let _ = self.tx.send(RouterCommand::ConnectionClosed { key }).await;
    }

    pub async fn list_connections(&self) -> Result<Vec<ConnectionDetails>, RouterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RouterCommand::ListConnections { reply })
            .await
            .map_err(|_| RouterError::Unavailable)?;
        rx.await.map_err(|_| RouterError::Unavailable)
    }

    /// Tear down every half-connection and stop the router task.
    ///
    /// Dropping the router's pipeline handle is what lets the pipeline
    /// drain and close its processors afterwards.  Resolves once the
    /// teardown has happened; idempotent if the router is already gone.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(RouterCommand::Shutdown { reply })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

/// Spawn the router task.
pub fn spawn_router(pipeline: PipelineHandle) -> RouterHandle {
    let (tx, rx) = mpsc::channel(1024);
    let router = Router {
        connections: HashMap::new(),
        buffers: HashMap::new(),
        pipeline,
    };
    tokio::spawn(router.run(rx));
    RouterHandle { tx }
}

struct RegisteredPeer {
    origin_type: OriginType,
    outbound: mpsc::Sender<Envelope>,
    session_id: Uuid,
}

struct Router {
    connections: HashMap<ConnectionKey, RegisteredPeer>,
    buffers: HashMap<ConnectionKey, VecDeque<Envelope>>,
    pipeline: PipelineHandle,
}

impl Router {
    async fn run(mut self, mut rx: mpsc::Receiver<RouterCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                RouterCommand::Register { peer, reply } => {
                    let session_id = self.register(peer).await;
                    let _ = reply.send(session_id);
                }
                RouterCommand::RouteS2 { origin, payload } => {
                    self.route_s2(&origin, payload).await;
                }
                RouterCommand::Inject {
                    origin_id,
                    dest_id,
                    payload,
                    reply,
                } => {
                    let _ = reply.send(self.inject(&origin_id, &dest_id, payload).await);
                }
                RouterCommand::ConnectionClosed { key } => {
                    self.connection_closed(&key);
                }
                RouterCommand::ListConnections { reply } => {
                    let _ = reply.send(self.list_connections());
                }
                RouterCommand::Shutdown { reply } => {
                    self.shutdown_all();
                    let _ = reply.send(());
                    break;
                }
            }
        }
        info!("session router stopped");
    }

    /// Stop every half-connection, emitting the usual teardown per pair.
    fn shutdown_all(&mut self) {
        info!(
            connections = self.connections.len(),
            "stopping all half-connections"
        );
        while let Some(key) = self.connections.keys().next().cloned() {
            self.connection_closed(&key);
        }
        self.buffers.clear();
    }

    fn ids_for(key: &ConnectionKey, origin_type: OriginType) -> (String, String) {
        if origin_type.is_cem() {
            (key.origin_id.clone(), key.dest_id.clone())
        } else {
            (key.dest_id.clone(), key.origin_id.clone())
        }
    }

    async fn register(&mut self, peer: PeerRegistration) -> Uuid {
        let key = peer.key();
        let partner_key = key.reversed();

        // Reuse the partner's session when it is already up, otherwise this
        // is a fresh session.
        let session_id = match self.connections.get(&partner_key) {
            Some(partner) => partner.session_id,
            None => {
                let session_id = Uuid::new_v4();
                self.pipeline.enqueue(Message::lifecycle(
                    session_id,
                    peer.cem_id(),
                    peer.rm_id(),
                    peer.origin_type,
                    MessageType::SessionStarted,
                ));
                session_id
            }
        };

        info!(key = %key, session_id = %session_id, "half-connection registered");
        let outbound = peer.outbound.clone();
        self.connections.insert(
            key.clone(),
            RegisteredPeer {
                origin_type: peer.origin_type,
                outbound,
                session_id,
            },
        );

        // Deliver anything that was waiting for this side, oldest first.
        if let Some(buffered) = self.buffers.remove(&key) {
            info!(key = %key, count = buffered.len(), "draining buffered envelopes");
            for envelope in buffered {
                if peer.outbound.send(envelope).await.is_err() {
                    warn!(key = %key, "half-connection went away while draining its buffer");
                    break;
                }
            }
        }

        session_id
    }

    async fn route_s2(&mut self, origin: &ConnectionKey, payload: serde_json::Value) {
        let Some(origin_peer) = self.connections.get(origin) else {
            warn!(key = %origin, "dropping payload routed from an unregistered half-connection");
            return;
        };
        let session_id = origin_peer.session_id;
        let origin_type = origin_peer.origin_type;
        let (cem_id, rm_id) = Self::ids_for(origin, origin_type);

        // The observation path always sees the message, connected partner
        // or not.
        self.pipeline.enqueue(Message {
            session_id,
            cem_id,
            rm_id,
            origin: origin_type,
            timestamp: Utc::now(),
            message_type: MessageType::S2,
            msg: Some(payload.clone()),
            s2_msg: None,
            s2_msg_type: None,
            s2_validation_error: None,
        });

        let envelope = Envelope::new(origin.origin_id.clone(), origin.dest_id.clone(), payload);
        let partner_key = origin.reversed();
        match self.connections.get(&partner_key) {
            Some(partner) => {
                if partner.outbound.send(envelope).await.is_err() {
                    warn!(key = %partner_key, "partner outbound queue closed; dropping envelope");
                }
            }
            None => {
                info!(key = %partner_key, "partner not connected; buffering envelope");
                let buffer = self.buffers.entry(partner_key.clone()).or_default();
                if buffer.len() >= MAX_BUFFERED_ENVELOPES {
                    warn!(
                        key = %partner_key,
                        cap = MAX_BUFFERED_ENVELOPES,
                        "buffer overflow; dropping oldest envelope"
                    );
                    buffer.pop_front();
                }
                buffer.push_back(envelope);
            }
        }
    }

    async fn inject(
        &mut self,
        origin_id: &str,
        dest_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), RouterError> {
        let key = ConnectionKey::new(origin_id, dest_id);
        let Some(origin_peer) = self.connections.get(&key) else {
            return Err(RouterError::NoConnection(
                origin_id.to_owned(),
                dest_id.to_owned(),
            ));
        };

        let origin_type = origin_peer.origin_type;
        let (cem_id, rm_id) = Self::ids_for(&key, origin_type);
        self.pipeline.enqueue(Message::lifecycle(
            origin_peer.session_id,
            &cem_id,
            &rm_id,
            origin_type,
            MessageType::MsgInjected,
        ));

        self.route_s2(&key, payload).await;
        Ok(())
    }

    fn connection_closed(&mut self, key: &ConnectionKey) {
        let partner_key = key.reversed();

        let mut session_id = None;
        let mut origin_type = OriginType::Rm;
        if let Some(peer) = self.connections.remove(key) {
            session_id = Some(peer.session_id);
            origin_type = peer.origin_type;
        }
        // Removing the partner entry drops the router's clone of its
        // outbound sender, which lets the partner's writer task wind down.
        if let Some(partner) = self.connections.remove(&partner_key) {
            if session_id.is_none() {
                session_id = Some(partner.session_id);
                origin_type = partner.origin_type.reverse();
            }
        }

        self.buffers.remove(key);
        self.buffers.remove(&partner_key);

        if let Some(session_id) = session_id {
            let (cem_id, rm_id) = Self::ids_for(key, origin_type);
            info!(key = %key, session_id = %session_id, "session ended");
            self.pipeline.enqueue(Message::lifecycle(
                session_id,
                &cem_id,
                &rm_id,
                origin_type,
                MessageType::SessionEnded,
            ));
        }
    }

    fn list_connections(&self) -> Vec<ConnectionDetails> {
        self.connections
            .iter()
            .map(|(key, peer)| ConnectionDetails {
                origin_id: key.origin_id.clone(),
                dest_id: key.dest_id.clone(),
                origin_type: peer.origin_type,
                session_id: peer.session_id,
            })
            .collect()
    }
}
