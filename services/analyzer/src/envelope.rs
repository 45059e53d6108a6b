//! Routing wrapper around a forwarded payload.
//!
//! Envelopes identify their endpoints by id rather than by handle; the
//! router's connection map is the only place ids resolve to live queues.

use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Envelope {
    pub envelope_id: Uuid,
    pub origin_id: String,
    pub dest_id: String,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(origin_id: impl Into<String>, dest_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            envelope_id: Uuid::new_v4(),
            origin_id: origin_id.into(),
            dest_id: dest_id.into(),
            payload,
        }
    }
}
