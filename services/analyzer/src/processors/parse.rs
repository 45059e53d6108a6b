use async_trait::async_trait;
use tracing::warn;

use s2_protocol::{parse_message, raw_message_type};

use crate::pipeline::{Message, MessageProcessor, MessageType};

/// Second stage: promote the raw payload to a typed S2 message, or annotate
/// the record with validation details.  Never blocks forwarding — the
/// envelope left the router before this runs.
pub struct ParseProcessor;

#[async_trait]
impl MessageProcessor for ParseProcessor {
    fn name(&self) -> &'static str {
        "parse"
    }

    async fn process(&mut self, mut message: Message) -> Option<Message> {
        // Session lifecycle and inject markers pass through untouched.
        if message.message_type != MessageType::S2 {
            return Some(message);
        }
        let Some(raw) = &message.msg else {
            return Some(message);
        };

        match parse_message(raw) {
            Ok(typed) => {
                message.s2_msg_type = Some(typed.type_name().to_owned());
                message.s2_msg = Some(typed);
            }
            Err(details) => {
                warn!(
                    session_id = %message.session_id,
                    error = %details.msg,
                    "message failed validation"
                );
                message.s2_msg = None;
                message.s2_msg_type = raw_message_type(raw);
                message.s2_validation_error = Some(details);
            }
        }
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use s2_protocol::OriginType;
    use serde_json::json;
    use uuid::Uuid;

    fn s2(msg: serde_json::Value) -> Message {
        Message {
            session_id: Uuid::new_v4(),
            cem_id: "C1".to_owned(),
            rm_id: "R1".to_owned(),
            origin: OriginType::Rm,
            timestamp: Utc::now(),
            message_type: MessageType::S2,
            msg: Some(msg),
            s2_msg: None,
            s2_msg_type: None,
            s2_validation_error: None,
        }
    }

    #[tokio::test]
    async fn valid_payload_is_promoted() {
        let mut processor = ParseProcessor;
        let message = processor
            .process(s2(json!({
                "message_type": "Handshake",
                "message_id": "id1",
                "role": "RM"
            })))
            .await
            .unwrap();
        assert_eq!(message.s2_msg_type.as_deref(), Some("Handshake"));
        assert!(message.s2_msg.is_some());
        assert!(message.s2_validation_error.is_none());
    }

    #[tokio::test]
    async fn invalid_payload_keeps_best_effort_type_name() {
        let mut processor = ParseProcessor;
        let message = processor
            .process(s2(json!({
                "message_type": "FRBC.ActuatorStatus",
                "message_id": "x",
                "operation_mode_factor": 0.5
            })))
            .await
            .unwrap();
        assert!(message.s2_msg.is_none());
        assert_eq!(message.s2_msg_type.as_deref(), Some("FRBC.ActuatorStatus"));
        let details = message.s2_validation_error.unwrap();
        assert_eq!(details.errors.len(), 1);
    }

    #[tokio::test]
    async fn lifecycle_records_pass_through() {
        let mut processor = ParseProcessor;
        let message = Message::lifecycle(
            Uuid::new_v4(),
            "C1",
            "R1",
            OriginType::Cem,
            MessageType::SessionStarted,
        );
        let out = processor.process(message).await.unwrap();
        assert!(out.s2_msg_type.is_none());
        assert!(out.s2_validation_error.is_none());
    }
}
