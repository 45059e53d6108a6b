//! One half of a CEM<->RM session over a websocket.
//!
//! A half-connection runs a reader task and a writer task; they are never
//! collapsed into one, so a blocked write cannot starve reads.  Either task
//! finishing tears the other down and notifies the router exactly once.

use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use s2_protocol::OriginType;

use crate::adapter::{AdapterError, AdapterReceiver, AdapterSender};
use crate::envelope::Envelope;
use crate::router::{ConnectionKey, OUTBOUND_QUEUE_CAPACITY, PeerRegistration, RouterError, RouterHandle};

/// Immutable identity of a half-connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub origin_id: String,
    pub dest_id: String,
    pub origin_type: OriginType,
}

impl ConnectionInfo {
    pub fn new(
        origin_id: impl Into<String>,
        dest_id: impl Into<String>,
        origin_type: OriginType,
    ) -> Self {
        Self {
            origin_id: origin_id.into(),
            dest_id: dest_id.into(),
            origin_type,
        }
    }

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

impl std::fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}->{}",
            self.origin_type, self.origin_id, self.dest_id
        )
    }
}

/// Register a half-connection with the router and spawn its reader, writer,
/// and supervisor tasks.  Returns the session id and a handle that resolves
/// when the connection has fully wound down.
pub async fn spawn_connection(
    receiver: Box<dyn AdapterReceiver>,
    sender: Box<dyn AdapterSender>,
    info: ConnectionInfo,
    router: RouterHandle,
) -> Result<(Uuid, tokio::task::JoinHandle<()>), RouterError> {
    let (outbound_tx, outbound_rx) = mpsc::channel::<Envelope>(OUTBOUND_QUEUE_CAPACITY);

    // The writer must be consuming before registration: registering drains
    // any buffered envelopes straight into the outbound queue.
    let writer = tokio::spawn(writer_loop(outbound_rx, sender, info.clone()));

    let session_id = router
        .register(PeerRegistration {
            origin_id: info.origin_id.clone(),
            dest_id: info.dest_id.clone(),
            origin_type: info.origin_type,
            outbound: outbound_tx,
        })
        .await?;

    let reader = tokio::spawn(reader_loop(receiver, info.clone(), router.clone()));

    let supervisor = tokio::spawn(supervise(reader, writer, info, router));
    Ok((session_id, supervisor))
}

async fn supervise(
    reader: tokio::task::JoinHandle<()>,
    writer: tokio::task::JoinHandle<()>,
    info: ConnectionInfo,
    router: RouterHandle,
) {
    let mut reader = reader;
    let mut writer = writer;
    tokio::select! {
        _ = &mut reader => writer.abort(),
        _ = &mut writer => reader.abort(),
    }
    info!(connection = %info, "half-connection stopped");
    router.connection_closed(info.key()).await;
}

async fn reader_loop(
    mut receiver: Box<dyn AdapterReceiver>,
    info: ConnectionInfo,
    router: RouterHandle,
) {
    loop {
        let text = match receiver.receive().await {
            Ok(text) => text,
            Err(AdapterError::Closed) => {
                info!(connection = %info, "peer disconnected");
                return;
            }
            Err(AdapterError::Protocol(e)) => {
                warn!(connection = %info, error = %e, "protocol error; stopping connection");
                return;
            }
            Err(AdapterError::Io(e)) => {
                warn!(connection = %info, error = %e, "transport error; stopping connection");
                return;
            }
        };

        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(payload) if payload.is_object() => {
                if router.route_s2(info.key(), payload).await.is_err() {
                    return;
                }
            }
            Ok(_) => {
                warn!(connection = %info, "frame is valid JSON but not an object; dropping");
            }
            Err(e) => {
                // Dropped from the forwarding path only; it never existed at
                // the semantic layer.
                warn!(connection = %info, error = %e, "failed to decode frame as JSON; dropping");
            }
        }
    }
}

async fn writer_loop(
    mut outbound: mpsc::Receiver<Envelope>,
    mut sender: Box<dyn AdapterSender>,
    info: ConnectionInfo,
) {
    while let Some(envelope) = outbound.recv().await {
        let text = match serde_json::to_string(&envelope.payload) {
            Ok(text) => text,
            Err(e) => {
                warn!(connection = %info, error = %e, "failed to serialize envelope payload");
                continue;
            }
        };
        match sender.send(text).await {
            Ok(()) => {}
            Err(AdapterError::Closed) => {
                info!(connection = %info, "peer gone while sending");
                return;
            }
            Err(e) => {
                warn!(connection = %info, error = %e, "send failed; stopping writer");
                return;
            }
        }
    }
    // Router dropped our queue: session torn down. Say goodbye politely.
    let _ = sender.close(1000, String::new()).await;
}
