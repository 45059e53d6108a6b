use async_trait::async_trait;
use tracing::error;

use crate::db::Store;
use crate::pipeline::{Message, MessageProcessor};

/// Third stage: append one communications row per message.  A failed write
/// is logged and isolated; later rows are unaffected.
pub struct StoreProcessor {
    store: Store,
}

impl StoreProcessor {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MessageProcessor for StoreProcessor {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn process(&mut self, message: Message) -> Option<Message> {
        if let Err(e) = self.store.insert_communication(&message) {
            error!(
                session_id = %message.session_id,
                error = %e,
                "failed to persist communication"
            );
        }
        Some(message)
    }
}
