use async_trait::async_trait;
use tracing::info;

use crate::pipeline::{Message, MessageProcessor};

/// First stage: structured log line per observed message.
pub struct LogProcessor;

#[async_trait]
impl MessageProcessor for LogProcessor {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn process(&mut self, message: Message) -> Option<Message> {
        info!(
            session_id = %message.session_id,
            origin = %message.origin,
            message_type = message.message_type.as_str(),
            "message received"
        );
        Some(message)
    }
}
