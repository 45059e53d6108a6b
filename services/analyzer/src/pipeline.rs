//! The message-processing pipeline.
//!
//! A single consumer task pops messages off an unbounded queue and threads
//! them through an ordered processor chain.  Processors annotate or consume
//! the message; none of them can take the process down.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use s2_protocol::{OriginType, S2Message, ValidationDetails};

/// Discriminates what a pipeline record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "S2")]
    S2,
    #[serde(rename = "SESSION_STARTED")]
    SessionStarted,
    #[serde(rename = "SESSION_ENDED")]
    SessionEnded,
    #[serde(rename = "MSG_INJECTED")]
    MsgInjected,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::S2 => "S2",
            MessageType::SessionStarted => "SESSION_STARTED",
            MessageType::SessionEnded => "SESSION_ENDED",
            MessageType::MsgInjected => "MSG_INJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "S2" => Some(Self::S2),
            "SESSION_STARTED" => Some(Self::SessionStarted),
            "SESSION_ENDED" => Some(Self::SessionEnded),
            "MSG_INJECTED" => Some(Self::MsgInjected),
            _ => None,
        }
    }
}

/// One observed message (or session-lifecycle event) flowing through the
/// pipeline.  The raw payload is always preserved; the parse processor fills
/// in the typed view and validation details.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub session_id: Uuid,
    pub cem_id: String,
    pub rm_id: String,
    pub origin: OriginType,
    pub timestamp: DateTime<Utc>,
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s2_msg: Option<S2Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s2_msg_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s2_validation_error: Option<ValidationDetails>,
}

impl Message {
    /// A payload-less session-lifecycle or inject-marker record.
    pub fn lifecycle(
        session_id: Uuid,
        cem_id: &str,
        rm_id: &str,
        origin: OriginType,
        message_type: MessageType,
    ) -> Self {
        Self {
            session_id,
            cem_id: cem_id.to_owned(),
            rm_id: rm_id.to_owned(),
            origin,
            timestamp: Utc::now(),
            message_type,
            msg: None,
            s2_msg: None,
            s2_msg_type: None,
            s2_validation_error: None,
        }
    }
}

/// One stage of the pipeline.
///
/// Returning `None` stops further processing for that message only.
#[async_trait]
pub trait MessageProcessor: Send {
    fn name(&self) -> &'static str;

    async fn process(&mut self, message: Message) -> Option<Message>;

    /// Called once at pipeline shutdown.
    async fn close(&mut self) {}
}

/// Cloneable producer side of the pipeline queue.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl PipelineHandle {
    pub fn enqueue(&self, message: Message) {
        // The consumer only goes away at shutdown; losing a message then is
        // acceptable.
        let _ = self.tx.send(message);
    }

    /// A handle whose queue is returned to the caller instead of being
    /// consumed by a processor chain.  Unit tests use this to observe what
    /// other components enqueue.
    pub fn for_tests() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// Composes the processor chain in its required order, then spawns the
/// consumer task.
pub struct PipelineBuilder {
    processors: Vec<Box<dyn MessageProcessor>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            processors: Vec::new(),
        }
    }

    /// Append a processor.  The standard chain is log, parse, store,
    /// debugger fan-out, session updates; anything added afterwards runs
    /// last.
    pub fn with(mut self, processor: Box<dyn MessageProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn spawn(self) -> (PipelineHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_pipeline(rx, self.processors));
        (PipelineHandle { tx }, task)
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_pipeline(
    mut rx: mpsc::UnboundedReceiver<Message>,
    mut processors: Vec<Box<dyn MessageProcessor>>,
) {
    while let Some(message) = rx.recv().await {
        let mut current = Some(message);
        for processor in &mut processors {
            let Some(message) = current.take() else { break };
            current = processor.process(message).await;
            if current.is_none() {
                debug!(processor = processor.name(), "processor consumed message");
            }
        }
    }
    for processor in &mut processors {
        processor.close().await;
    }
    info!("message pipeline stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        seen: Arc<AtomicUsize>,
        drop_all: bool,
    }

    #[async_trait]
    impl MessageProcessor for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn process(&mut self, message: Message) -> Option<Message> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if self.drop_all { None } else { Some(message) }
        }
    }

    fn s2_message() -> Message {
        Message {
            session_id: Uuid::new_v4(),
            cem_id: "C1".to_owned(),
            rm_id: "R1".to_owned(),
            origin: OriginType::Rm,
            timestamp: Utc::now(),
            message_type: MessageType::S2,
            msg: Some(json!({"message_type": "Handshake", "message_id": "id1"})),
            s2_msg: None,
            s2_msg_type: None,
            s2_validation_error: None,
        }
    }

    #[tokio::test]
    async fn processors_run_in_declared_order_and_none_short_circuits() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let (handle, task) = PipelineBuilder::new()
            .with(Box::new(Counting {
                seen: first.clone(),
                drop_all: true,
            }))
            .with(Box::new(Counting {
                seen: second.clone(),
                drop_all: false,
            }))
            .spawn();

        handle.enqueue(s2_message());
        handle.enqueue(s2_message());
        drop(handle);
        task.await.unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn message_type_wire_names_round_trip() {
        for mt in [
            MessageType::S2,
            MessageType::SessionStarted,
            MessageType::SessionEnded,
            MessageType::MsgInjected,
        ] {
            assert_eq!(MessageType::parse(mt.as_str()), Some(mt));
        }
        assert_eq!(MessageType::parse("nope"), None);
    }

    #[test]
    fn observer_view_serializes_the_wire_fields() {
        let message = s2_message();
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["message_type"], "S2");
        assert_eq!(value["origin"], "RM");
        assert_eq!(value["msg"]["message_id"], "id1");
        assert!(value.get("s2_validation_error").is_none());
    }
}
