//! Fan-out of pipeline messages to debugger observers.
//!
//! Observer handles live in a shared registry so that websocket handlers
//! can subscribe without going through the pipeline task.  Handles whose
//! queue has closed are pruned lazily on each fan-out pass.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::pipeline::{Message, MessageProcessor};

/// Queue depth per observer before messages are dropped for that observer.
pub const OBSERVER_QUEUE_CAPACITY: usize = 256;

/// Which messages an observer wants.  OR-logic across the supplied fields;
/// no fields supplied means match-all.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebuggerFilter {
    pub session_id: Option<Uuid>,
    pub cem_id: Option<String>,
    pub rm_id: Option<String>,
    #[serde(default)]
    pub include_session_history: bool,
}

impl DebuggerFilter {
    pub fn matches(&self, message: &Message) -> bool {
        if self.session_id.is_none() && self.cem_id.is_none() && self.rm_id.is_none() {
            return true;
        }
        self.session_id == Some(message.session_id)
            || self.cem_id.as_deref() == Some(message.cem_id.as_str())
            || self.rm_id.as_deref() == Some(message.rm_id.as_str())
    }
}

/// One subscribed debugger frontend.
pub struct DebuggerObserver {
    pub filter: DebuggerFilter,
    pub queue: mpsc::Sender<Message>,
}

/// Shared list of live observers.
pub type DebuggerRegistry = Arc<RwLock<Vec<DebuggerObserver>>>;

pub fn new_registry() -> DebuggerRegistry {
    Arc::new(RwLock::new(Vec::new()))
}

/// Fourth stage: push a view of the message to each matching observer.
pub struct DebuggerProcessor {
    observers: DebuggerRegistry,
}

impl DebuggerProcessor {
    pub fn new(observers: DebuggerRegistry) -> Self {
        Self { observers }
    }
}

#[async_trait]
impl MessageProcessor for DebuggerProcessor {
    fn name(&self) -> &'static str {
        "debugger"
    }

    async fn process(&mut self, message: Message) -> Option<Message> {
        let mut observers = self.observers.write().expect("observer registry lock");
        observers.retain(|observer| !observer.queue.is_closed());
        for observer in observers.iter() {
            if !observer.filter.matches(&message) {
                continue;
            }
            match observer.queue.try_send(message.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("debugger observer is lagging; dropping message for it");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("debugger observer went away mid fan-out");
                }
            }
        }
        drop(observers);
        Some(message)
    }

    async fn close(&mut self) {
        // Dropping the handles closes each observer's queue, which ends its
        // websocket pump.
        self.observers
            .write()
            .expect("observer registry lock")
            .clear();
    }
}
