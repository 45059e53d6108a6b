//! Correlates sent message ids with their incoming `ReceptionStatus`.
//!
//! `send_and_await` is the reliable-send helper: route the message, then
//! park until the matching acknowledgement shows up.  No timeout is imposed
//! here; callers that need one wrap the future in `tokio::time::timeout`.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::oneshot;

use s2_protocol::{ReceptionStatus, ReceptionStatusValues};

use crate::router::{ConnectionKey, RouterError, RouterHandle};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("payload has no message_id")]
    MissingMessageId,
    #[error("expected a ReceptionStatus, got {0}")]
    NotReceptionStatus(String),
    #[error("ReceptionStatus for {0} was already received")]
    DuplicateReception(String),
    #[error("ReceptionStatus was not OK but {0:?}")]
    ReceptionNotOk(ReceptionStatusValues),
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error("awaiter signal dropped")]
    SignalLost,
}

#[derive(Default)]
struct AwaiterInner {
    received: HashMap<String, ReceptionStatus>,
    awaiting: HashMap<String, oneshot::Sender<()>>,
}

/// One awaiter exists per device model; its maps are only reached through
/// this type.
#[derive(Default)]
pub struct ReceptionStatusAwaiter {
    inner: Mutex<AwaiterInner>,
}

impl ReceptionStatusAwaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve once the `ReceptionStatus` for `message_id` is available,
    /// consuming it.
    pub async fn wait_for(&self, message_id: &str) -> Result<ReceptionStatus, SendError> {
        let signal = {
            let mut inner = self.inner.lock().expect("awaiter lock");
            if let Some(status) = inner.received.remove(message_id) {
                return Ok(status);
            }
            let (tx, rx) = oneshot::channel();
            inner.awaiting.insert(message_id.to_owned(), tx);
            rx
        };

        signal.await.map_err(|_| SendError::SignalLost)?;

        let mut inner = self.inner.lock().expect("awaiter lock");
        inner
            .received
            .remove(message_id)
            .ok_or(SendError::SignalLost)
    }

    /// Route `payload` from `origin` and wait for its acknowledgement.
    pub async fn send_and_await(
        &self,
        router: &RouterHandle,
        origin: ConnectionKey,
        payload: serde_json::Value,
        raise_on_non_ok: bool,
    ) -> Result<ReceptionStatus, SendError> {
        let message_id = payload
            .get("message_id")
            .and_then(|v| v.as_str())
            .ok_or(SendError::MissingMessageId)?
            .to_owned();

        router.route_s2(origin, payload).await?;
        let status = self.wait_for(&message_id).await?;

        if status.status != ReceptionStatusValues::Ok && raise_on_non_ok {
            return Err(SendError::ReceptionNotOk(status.status));
        }
        Ok(status)
    }

    /// Record an incoming `ReceptionStatus` payload and wake any awaiter.
    ///
    /// A second status for the same subject id is a fault: the first one is
    /// kept and `DuplicateReception` is returned.
    pub fn receive(&self, payload: &serde_json::Value) -> Result<(), SendError> {
        let message_type = payload
            .get("message_type")
            .and_then(|v| v.as_str())
            .unwrap_or("<none>");
        if message_type != "ReceptionStatus" {
            return Err(SendError::NotReceptionStatus(message_type.to_owned()));
        }

        let status: ReceptionStatus = serde_json::from_value(payload.clone())
            .map_err(|e| SendError::NotReceptionStatus(e.to_string()))?;
        let subject = status.subject_message_id.clone();

        let mut inner = self.inner.lock().expect("awaiter lock");
        if inner.received.contains_key(&subject) {
            return Err(SendError::DuplicateReception(subject));
        }
        inner.received.insert(subject.clone(), status);
        if let Some(signal) = inner.awaiting.remove(&subject) {
            let _ = signal.send(());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reception_status(subject: &str, status: &str) -> serde_json::Value {
        json!({
            "message_type": "ReceptionStatus",
            "subject_message_id": subject,
            "status": status
        })
    }

    #[tokio::test]
    async fn wait_after_receive_returns_immediately() {
        let awaiter = ReceptionStatusAwaiter::new();
        awaiter.receive(&reception_status("m1", "OK")).unwrap();
        let status = awaiter.wait_for("m1").await.unwrap();
        assert_eq!(status.status, ReceptionStatusValues::Ok);
    }

    #[tokio::test]
    async fn wait_before_receive_parks_until_signaled() {
        let awaiter = std::sync::Arc::new(ReceptionStatusAwaiter::new());
        let waiter = {
            let awaiter = awaiter.clone();
            tokio::spawn(async move { awaiter.wait_for("m2").await })
        };
        tokio::task::yield_now().await;
        awaiter.receive(&reception_status("m2", "OK")).unwrap();
        let status = waiter.await.unwrap().unwrap();
        assert_eq!(status.subject_message_id, "m2");
    }

    #[test]
    fn duplicate_reception_keeps_the_first() {
        let awaiter = ReceptionStatusAwaiter::new();
        awaiter.receive(&reception_status("m3", "OK")).unwrap();
        let err = awaiter
            .receive(&reception_status("m3", "PERMANENT_ERROR"))
            .unwrap_err();
        assert!(matches!(err, SendError::DuplicateReception(id) if id == "m3"));
    }

    #[test]
    fn non_reception_status_is_rejected() {
        let awaiter = ReceptionStatusAwaiter::new();
        let err = awaiter
            .receive(&json!({"message_type": "Handshake", "message_id": "x"}))
            .unwrap_err();
        assert!(matches!(err, SendError::NotReceptionStatus(_)));
    }

    #[tokio::test]
    async fn send_and_await_raises_on_non_ok_when_asked() {
        use crate::pipeline::PipelineHandle;
        use crate::router::{PeerRegistration, spawn_router};
        use s2_protocol::OriginType;
        use tokio::sync::mpsc;

        let (pipeline, _messages) = PipelineHandle::for_tests();
        let router = spawn_router(pipeline);
        let (tx, _rx) = mpsc::channel(8);
        router
            .register(PeerRegistration {
                origin_id: "C1".to_owned(),
                dest_id: "R1".to_owned(),
                origin_type: OriginType::Cem,
                outbound: tx,
            })
            .await
            .unwrap();

        let awaiter = std::sync::Arc::new(ReceptionStatusAwaiter::new());
        let send = {
            let awaiter = awaiter.clone();
            let router = router.clone();
            tokio::spawn(async move {
                awaiter
                    .send_and_await(
                        &router,
                        ConnectionKey::new("C1", "R1"),
                        json!({"message_type": "Handshake", "message_id": "m4"}),
                        true,
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;
        awaiter
            .receive(&reception_status("m4", "INVALID_MESSAGE"))
            .unwrap();
        let err = send.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            SendError::ReceptionNotOk(ReceptionStatusValues::InvalidMessage)
        ));
    }
}
