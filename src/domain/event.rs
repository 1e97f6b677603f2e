use super::QUEUE_SIZE_EVENT_LOG;
use crate::library::communication::event::{Notification, QueueDescriptor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

const QUEUE_KEY: &str = "event.received";

/// Unique identifier of an event
pub type EventIdentifier = Uuid;

/// Error thrown when a raw payload can not be turned into an [`EventPayload`]
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Input is not parseable as JSON
    #[error("payload is not valid JSON")]
    Syntax(#[source] serde_json::Error),
    /// Input parses but its top-level value is not an object
    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// Arbitrary JSON object submitted alongside an event
///
/// The pipeline treats it as opaque data, only the top-level shape (it has to
/// be an object) is enforced at the ingress boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct EventPayload(Map<String, Value>);

impl EventPayload {
    /// Parses and validates a raw request body
    pub fn from_slice(raw: &[u8]) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_slice(raw).map_err(PayloadError::Syntax)?;

        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(PayloadError::NotAnObject),
        }
    }

    /// Consumes the payload, yielding the contained JSON object
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Retrieves a top-level field by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

impl From<Map<String, Value>> for EventPayload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// New event has been accepted at the ingress boundary and awaits processing
///
/// Published exactly once per accepted submission, after the identifier has
/// been handed back to the client. Consumed by the worker group, where each
/// notification is delivered to exactly one member at a time.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct EventReceivedNotification {
    /// Unique identifier assigned at ingress
    pub event_id: EventIdentifier,

    /// Client-provided event content
    pub payload: EventPayload,

    /// Time at which the ingress accepted the submission
    pub created_at: DateTime<Utc>,
}

impl EventReceivedNotification {
    /// Creates a new instance with a fresh identifier and the current time
    pub fn new(payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            payload,
            created_at: Utc::now(),
        }
    }
}

impl Notification for EventReceivedNotification {
    fn queue() -> QueueDescriptor {
        QueueDescriptor::new(QUEUE_KEY.into(), QUEUE_SIZE_EVENT_LOG)
    }
}

#[cfg(test)]
mod does {
    use super::*;

    #[test]
    fn accept_json_objects() {
        let payload = EventPayload::from_slice(br#"{"kind":"signup","user":42}"#).unwrap();
        assert_eq!(payload.get("user"), Some(&Value::from(42)));
    }

    #[test]
    fn reject_non_object_payloads() {
        assert!(matches!(
            EventPayload::from_slice(b"[1, 2, 3]"),
            Err(PayloadError::NotAnObject)
        ));
        assert!(matches!(
            EventPayload::from_slice(b"not json at all"),
            Err(PayloadError::Syntax(_))
        ));
    }

    #[test]
    fn assign_unique_identifiers() {
        let a = EventReceivedNotification::new(EventPayload::default());
        let b = EventReceivedNotification::new(EventPayload::default());
        assert_ne!(a.event_id, b.event_id);
    }
}
