//! Event envelope - the decoded form of one log record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::EventError;

/// Event-specific payload fields.
pub type Payload = Map<String, Value>;

/// The decoded, typed representation of one log record.
///
/// Envelopes are immutable once decoded; the fields are public for reading
/// and for building synthetic events before they are published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// When the event occurred, in unix seconds.
    pub timestamp: i64,

    /// The event type (e.g. "OrderCreated").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Schema version for this event type.
    pub version: String,

    /// Event-specific payload.
    pub payload: Payload,
}

impl EventEnvelope {
    /// Creates an envelope stamped with the current time and version "1".
    pub fn new(event_type: impl Into<String>, payload: Payload) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: event_type.into(),
            version: "1".to_string(),
            payload,
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Looks up a top-level payload field.
    pub fn payload_field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    /// Looks up a top-level payload field holding a string.
    pub fn payload_str(&self, name: &str) -> Option<&str> {
        self.payload_field(name).and_then(Value::as_str)
    }
}

/// Decodes one raw log record into an envelope.
///
/// `type` (a string) and `payload` (an object) are required. A missing
/// `timestamp` decodes as `0` and a missing `version` as an empty string;
/// a numeric version is accepted and rendered as text. Unknown top-level
/// fields are ignored.
pub fn decode(raw: &[u8]) -> Result<EventEnvelope, EventError> {
    let text = std::str::from_utf8(raw).map_err(|e| EventError::Malformed(e.to_string()))?;
    let document: Value =
        serde_json::from_str(text).map_err(|e| EventError::Malformed(e.to_string()))?;

    let Value::Object(mut fields) = document else {
        return Err(EventError::Malformed(
            "record is not a JSON object".to_string(),
        ));
    };

    let event_type = match fields.remove("type") {
        Some(Value::String(s)) => s,
        Some(_) => {
            return Err(EventError::InvalidField {
                field: "type",
                expected: "a string",
            })
        }
        None => return Err(EventError::MissingField("type")),
    };

    let payload = match fields.remove("payload") {
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(EventError::InvalidField {
                field: "payload",
                expected: "an object",
            })
        }
        None => return Err(EventError::MissingField("payload")),
    };

    let timestamp = match fields.remove("timestamp") {
        None | Some(Value::Null) => 0,
        Some(Value::Number(n)) => n.as_i64().ok_or(EventError::InvalidField {
            field: "timestamp",
            expected: "an integer",
        })?,
        Some(_) => {
            return Err(EventError::InvalidField {
                field: "timestamp",
                expected: "an integer",
            })
        }
    };

    let version = match fields.remove("version") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => {
            return Err(EventError::InvalidField {
                field: "version",
                expected: "a string",
            })
        }
    };

    Ok(EventEnvelope {
        timestamp,
        event_type,
        version,
        payload,
    })
}

/// Encodes an envelope into its wire representation.
pub fn encode(envelope: &EventEnvelope) -> Result<Vec<u8>, EventError> {
    Ok(serde_json::to_vec(envelope)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_decode_full_record() {
        let raw = br#"{"timestamp":1554754390,"type":"OrderCreated","version":"1","payload":{"orderID":"A1","quantity":10}}"#;
        let envelope = decode(raw).unwrap();

        assert_eq!(envelope.timestamp, 1554754390);
        assert_eq!(envelope.event_type, "OrderCreated");
        assert_eq!(envelope.version, "1");
        assert_eq!(envelope.payload_str("orderID"), Some("A1"));
        assert_eq!(envelope.payload_field("quantity"), Some(&json!(10)));
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let raw = br#"{"type":"OrderAssigned","payload":{"orderID":"A1"},"traceparent":"00-abc","extra":{"nested":true}}"#;
        let envelope = decode(raw).unwrap();
        assert_eq!(envelope.event_type, "OrderAssigned");
        assert_eq!(envelope.timestamp, 0);
        assert_eq!(envelope.version, "");
    }

    #[test]
    fn test_decode_numeric_version() {
        let raw = br#"{"type":"OrderCreated","version":2,"payload":{}}"#;
        assert_eq!(decode(raw).unwrap().version, "2");
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(matches!(
            decode(b"not json at all"),
            Err(EventError::Malformed(_))
        ));
        assert!(matches!(
            decode(&[0xff, 0xfe, 0x00]),
            Err(EventError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_rejects_non_object() {
        assert!(matches!(
            decode(br#"["OrderCreated"]"#),
            Err(EventError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_requires_type_and_payload() {
        assert_eq!(
            decode(br#"{"payload":{"orderID":"A1"}}"#),
            Err(EventError::MissingField("type"))
        );
        assert_eq!(
            decode(br#"{"type":"OrderCreated"}"#),
            Err(EventError::MissingField("payload"))
        );
    }

    #[test]
    fn test_decode_rejects_wrong_field_types() {
        assert!(matches!(
            decode(br#"{"type":7,"payload":{}}"#),
            Err(EventError::InvalidField { field: "type", .. })
        ));
        assert!(matches!(
            decode(br#"{"type":"OrderCreated","payload":"A1"}"#),
            Err(EventError::InvalidField {
                field: "payload",
                ..
            })
        ));
        assert!(matches!(
            decode(br#"{"type":"OrderCreated","timestamp":"now","payload":{}}"#),
            Err(EventError::InvalidField {
                field: "timestamp",
                ..
            })
        ));
    }

    #[test]
    fn test_encode_writes_wire_names() {
        let envelope = EventEnvelope::new(
            "OrderContainerAllocated",
            payload(json!({"orderID": "A1", "containerID": "c10"})),
        )
        .with_timestamp(100);

        let value: Value = serde_json::from_slice(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(value["type"], "OrderContainerAllocated");
        assert_eq!(value["version"], "1");
        assert_eq!(value["timestamp"], 100);
        assert_eq!(value["payload"]["containerID"], "c10");
        assert_eq!(decode(&encode(&envelope).unwrap()).unwrap(), envelope);
    }

    proptest! {
        #[test]
        fn decode_never_panics(raw in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = decode(&raw);
        }

        #[test]
        fn decode_keeps_payload_strings(
            event_type in "[A-Za-z]{1,20}",
            order_id in "[a-zA-Z0-9-]{1,16}",
        ) {
            let raw = json!({"type": event_type, "payload": {"orderID": order_id}}).to_string();
            let envelope = decode(raw.as_bytes()).unwrap();
            prop_assert_eq!(&envelope.event_type, &event_type);
            prop_assert_eq!(envelope.payload_str("orderID"), Some(order_id.as_str()));
        }
    }
}
