//! Session-lifecycle reconciliation and the session-updates stream.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::pipeline::{Message, MessageProcessor, MessageType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Open,
    Closed,
}

/// The current shape of one session, as streamed to session-update
/// observers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub cem_id: String,
    pub rm_id: String,
    pub state: SessionState,
    pub start_timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<DateTime<Utc>>,
}

/// Open sessions, shared with the subscribe path so a new observer can be
/// brought up to date.
pub type SharedSessions = Arc<RwLock<HashMap<Uuid, SessionSnapshot>>>;

pub fn new_shared_sessions() -> SharedSessions {
    Arc::new(RwLock::new(HashMap::new()))
}

pub struct SessionObserver {
    pub queue: mpsc::Sender<SessionSnapshot>,
}

pub type SessionObserverRegistry = Arc<RwLock<Vec<SessionObserver>>>;

pub fn new_observer_registry() -> SessionObserverRegistry {
    Arc::new(RwLock::new(Vec::new()))
}

/// Fifth stage: maintain open/closed session snapshots and broadcast
/// changes.
pub struct SessionProcessor {
    observers: SessionObserverRegistry,
    sessions: SharedSessions,
}

impl SessionProcessor {
    pub fn new(observers: SessionObserverRegistry, sessions: SharedSessions) -> Self {
        Self {
            observers,
            sessions,
        }
    }

    fn open_session(&self, message: &Message) -> SessionSnapshot {
        let snapshot = SessionSnapshot {
            session_id: message.session_id,
            cem_id: message.cem_id.clone(),
            rm_id: message.rm_id.clone(),
            state: SessionState::Open,
            start_timestamp: message.timestamp,
            end_timestamp: None,
        };
        self.sessions
            .write()
            .expect("session map lock")
            .insert(message.session_id, snapshot.clone());
        snapshot
    }

    fn close_session(&self, message: &Message) -> SessionSnapshot {
        let removed = self
            .sessions
            .write()
            .expect("session map lock")
            .remove(&message.session_id);
        match removed {
            Some(mut snapshot) => {
                snapshot.state = SessionState::Closed;
                snapshot.end_timestamp = Some(message.timestamp);
                snapshot
            }
            None => SessionSnapshot {
                session_id: message.session_id,
                cem_id: message.cem_id.clone(),
                rm_id: message.rm_id.clone(),
                state: SessionState::Closed,
                start_timestamp: message.timestamp,
                end_timestamp: Some(message.timestamp),
            },
        }
    }

    fn broadcast(&self, snapshot: &SessionSnapshot) {
        let mut observers = self.observers.write().expect("observer registry lock");
        observers.retain(|observer| !observer.queue.is_closed());
        for observer in observers.iter() {
            if observer.queue.try_send(snapshot.clone()).is_err() {
                warn!("session-update observer is lagging; dropping snapshot for it");
            }
        }
    }
}

#[async_trait]
impl MessageProcessor for SessionProcessor {
    fn name(&self) -> &'static str {
        "session-updates"
    }

    async fn process(&mut self, message: Message) -> Option<Message> {
        let snapshot = match message.message_type {
            MessageType::SessionStarted => self.open_session(&message),
            MessageType::SessionEnded => self.close_session(&message),
            MessageType::S2
                if !self
                    .sessions
                    .read()
                    .expect("session map lock")
                    .contains_key(&message.session_id) =>
            {
                // An S2 message without a prior SESSION_STARTED still opens
                // the session.
                self.open_session(&message)
            }
            _ => return Some(message),
        };

        self.broadcast(&snapshot);
        Some(message)
    }

    async fn close(&mut self) {
        self.observers
            .write()
            .expect("observer registry lock")
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s2_protocol::OriginType;

    fn lifecycle(session_id: Uuid, message_type: MessageType) -> Message {
        Message::lifecycle(session_id, "C1", "R1", OriginType::Rm, message_type)
    }

    async fn processor_with_observer() -> (
        SessionProcessor,
        mpsc::Receiver<SessionSnapshot>,
        SharedSessions,
    ) {
        let sessions = new_shared_sessions();
        let observers = new_observer_registry();
        let (tx, rx) = mpsc::channel(16);
        observers.write().unwrap().push(SessionObserver { queue: tx });
        (
            SessionProcessor::new(observers, sessions.clone()),
            rx,
            sessions,
        )
    }

    #[tokio::test]
    async fn started_then_ended_produces_open_then_closed() {
        let (mut processor, mut rx, sessions) = processor_with_observer().await;
        let session_id = Uuid::new_v4();

        processor
            .process(lifecycle(session_id, MessageType::SessionStarted))
            .await;
        let open = rx.recv().await.unwrap();
        assert_eq!(open.state, SessionState::Open);
        assert!(sessions.read().unwrap().contains_key(&session_id));

        processor
            .process(lifecycle(session_id, MessageType::SessionEnded))
            .await;
        let closed = rx.recv().await.unwrap();
        assert_eq!(closed.state, SessionState::Closed);
        assert!(closed.end_timestamp.is_some());
        assert!(sessions.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn leading_s2_message_opens_a_session_defensively() {
        let (mut processor, mut rx, _sessions) = processor_with_observer().await;
        processor
            .process(lifecycle(Uuid::new_v4(), MessageType::S2))
            .await;
        let open = rx.recv().await.unwrap();
        assert_eq!(open.state, SessionState::Open);
    }

    #[tokio::test]
    async fn s2_traffic_on_a_known_session_does_not_rebroadcast() {
        let (mut processor, mut rx, _sessions) = processor_with_observer().await;
        let session_id = Uuid::new_v4();
        processor
            .process(lifecycle(session_id, MessageType::SessionStarted))
            .await;
        rx.recv().await.unwrap();

        processor.process(lifecycle(session_id, MessageType::S2)).await;
        assert!(rx.try_recv().is_err());
    }
}
