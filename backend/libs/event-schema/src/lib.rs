//! Live event schema shared by every producer that pushes to connected clients
//!
//! Events are transient snapshots: they are never persisted and never alias
//! mutable entity state. A client that was offline re-derives state from the
//! read models on reconnect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// Enumerated event kinds
pub mod events;

pub use events::{EventFamily, LiveEventKind};

/// Identifier of the entity an event is about.
///
/// Q&A entities use numeric ids, conversations and rooms use UUIDs; the wire
/// form is a bare number or a UUID string respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Numeric(i64),
    Uuid(Uuid),
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Numeric(id)
    }
}

impl From<Uuid> for EntityId {
    fn from(id: Uuid) -> Self {
        EntityId::Uuid(id)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityId::Numeric(id) => write!(f, "{}", id),
            EntityId::Uuid(id) => write!(f, "{}", id),
        }
    }
}

/// Wire envelope: `{ eventType, entityId, userId, payload, timestamp }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveEvent {
    pub event_type: LiveEventKind,
    pub entity_id: EntityId,
    /// User whose action produced the event
    pub user_id: i64,
    #[serde(default)]
    pub payload: JsonValue,
    pub timestamp: DateTime<Utc>,
}

impl LiveEvent {
    pub fn new(event_type: LiveEventKind, entity_id: impl Into<EntityId>, user_id: i64) -> Self {
        Self {
            event_type,
            entity_id: entity_id.into(),
            user_id,
            payload: JsonValue::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload = payload;
        self
    }

    /// Serialize a payload struct; falls back to `null` on failure so that
    /// event construction never fails on the producer path.
    pub fn with_payload_of<T: Serialize>(self, payload: &T) -> Self {
        let value = serde_json::to_value(payload).unwrap_or(JsonValue::Null);
        self.with_payload(value)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
