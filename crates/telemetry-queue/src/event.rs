//! Event and queue record types.

use crate::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One structured telemetry record (log line or error report).
///
/// The store treats it as an opaque JSON object: it is serialized once on
/// enqueue and the stored text is never rewritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Map<String, Value>);

impl Event {
    /// Create an empty event.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap an existing JSON value, which must be an object.
    pub fn from_value(value: Value) -> StoreResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::InvalidEvent(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parse an event from JSON text.
    pub fn from_json_str(text: &str) -> StoreResult<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Serialize to the compact text stored in the queue.
    pub fn to_payload(&self) -> StoreResult<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

impl From<Map<String, Value>> for Event {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A persisted event with its queue position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRecord {
    /// Monotonic sequence id. Never reused, defines FIFO order.
    pub id: i64,
    /// Stored JSON text of the event.
    pub payload: String,
    /// Length of `payload` in bytes.
    pub byte_len: u64,
}

impl QueueRecord {
    /// Parse the stored payload back into an event.
    pub fn event(&self) -> StoreResult<Event> {
        Event::from_json_str(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_value_rejects_non_objects() {
        let err = Event::from_value(json!([1, 2])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid event: expected a JSON object, got an array"
        );
        assert!(Event::from_value(json!({"type": "log"})).is_ok());
    }

    #[test]
    fn payload_is_compact_json() {
        let mut event = Event::new();
        event.insert("type", "log");
        event.insert("timestamp", 1_700_000_000_000_i64);

        let payload = event.to_payload().unwrap();
        assert!(!payload.contains(' '));
        assert_eq!(Event::from_json_str(&payload).unwrap(), event);
    }

    #[test]
    fn record_parses_back_to_event() {
        let record = QueueRecord {
            id: 7,
            payload: r#"{"message":"hi"}"#.to_string(),
            byte_len: 16,
        };
        let event = record.event().unwrap();
        assert_eq!(event.get("message"), Some(&json!("hi")));
    }
}
