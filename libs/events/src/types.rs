//! Order event types.
//!
//! Each known event type has a payload struct. Field names follow the wire
//! format of the order service (`orderID`, `voyageID`, ...).

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{EventEnvelope, EventError, Payload};

/// All event type names as constants.
pub mod event_types {
    pub const ORDER_CREATED: &str = "OrderCreated";
    pub const ORDER_ASSIGNED: &str = "OrderAssigned";
    pub const ORDER_CONTAINER_ALLOCATED: &str = "OrderContainerAllocated";
}

/// Payload field carrying the order identifier.
pub const ORDER_ID_FIELD: &str = "orderID";

/// Payload for `OrderCreated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedPayload {
    #[serde(rename = "orderID")]
    pub order_id: String,

    #[serde(rename = "productID", default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    #[serde(rename = "customerID", default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Payload for `OrderAssigned`: the order was booked onto a voyage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAssignedPayload {
    #[serde(rename = "orderID")]
    pub order_id: String,

    #[serde(rename = "voyageID")]
    pub voyage_id: String,
}

/// Payload for `OrderContainerAllocated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerAllocatedPayload {
    #[serde(rename = "orderID")]
    pub order_id: String,

    #[serde(rename = "containerID")]
    pub container_id: String,
}

/// Typed view of an order event.
///
/// Types this crate does not know are kept as [`OrderEvent::Other`] rather
/// than rejected, since the log is shared with other producers.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    Created(OrderCreatedPayload),
    Assigned(OrderAssignedPayload),
    ContainerAllocated(ContainerAllocatedPayload),
    Other { event_type: String, payload: Payload },
}

impl OrderEvent {
    /// Interprets an envelope's payload according to its event type.
    pub fn from_envelope(envelope: &EventEnvelope) -> Result<Self, EventError> {
        let event = match envelope.event_type.as_str() {
            event_types::ORDER_CREATED => Self::Created(parse_payload(envelope)?),
            event_types::ORDER_ASSIGNED => Self::Assigned(parse_payload(envelope)?),
            event_types::ORDER_CONTAINER_ALLOCATED => {
                Self::ContainerAllocated(parse_payload(envelope)?)
            }
            other => Self::Other {
                event_type: other.to_string(),
                payload: envelope.payload.clone(),
            },
        };
        Ok(event)
    }

    /// Returns the wire event type.
    pub fn event_type(&self) -> &str {
        match self {
            Self::Created(_) => event_types::ORDER_CREATED,
            Self::Assigned(_) => event_types::ORDER_ASSIGNED,
            Self::ContainerAllocated(_) => event_types::ORDER_CONTAINER_ALLOCATED,
            Self::Other { event_type, .. } => event_type.as_str(),
        }
    }

    /// Returns the order id carried by the payload, if any.
    pub fn order_id(&self) -> Option<&str> {
        match self {
            Self::Created(p) => Some(p.order_id.as_str()),
            Self::Assigned(p) => Some(p.order_id.as_str()),
            Self::ContainerAllocated(p) => Some(p.order_id.as_str()),
            Self::Other { payload, .. } => payload.get(ORDER_ID_FIELD).and_then(Value::as_str),
        }
    }

    /// Builds an envelope for this event, stamped with the current time.
    pub fn to_envelope(&self) -> Result<EventEnvelope, EventError> {
        let payload = match self {
            Self::Created(p) => to_payload(p)?,
            Self::Assigned(p) => to_payload(p)?,
            Self::ContainerAllocated(p) => to_payload(p)?,
            Self::Other { payload, .. } => payload.clone(),
        };
        Ok(EventEnvelope::new(self.event_type(), payload))
    }
}

fn parse_payload<T: DeserializeOwned>(envelope: &EventEnvelope) -> Result<T, EventError> {
    serde_json::from_value(Value::Object(envelope.payload.clone())).map_err(|e| {
        EventError::InvalidPayload {
            event_type: envelope.event_type.clone(),
            message: e.to_string(),
        }
    })
}

fn to_payload<T: Serialize>(payload: &T) -> Result<Payload, EventError> {
    match serde_json::to_value(payload)? {
        Value::Object(map) => Ok(map),
        _ => Err(EventError::Serialization(
            "payload did not serialize to an object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event_type: &str, payload: Value) -> EventEnvelope {
        EventEnvelope::new(event_type, payload.as_object().cloned().unwrap())
    }

    #[test]
    fn test_dispatch_assigned() {
        let env = envelope(
            event_types::ORDER_ASSIGNED,
            json!({"orderID": "A1", "voyageID": "V9"}),
        );
        let OrderEvent::Assigned(payload) = OrderEvent::from_envelope(&env).unwrap() else {
            panic!("expected OrderAssigned");
        };
        assert_eq!(payload.voyage_id, "V9");
    }

    #[test]
    fn test_dispatch_created_ignores_extra_fields() {
        let env = envelope(
            event_types::ORDER_CREATED,
            json!({"orderID": "A1", "productID": "P02", "quantity": 10, "pickupAddress": {"city": "Oakland"}}),
        );
        let event = OrderEvent::from_envelope(&env).unwrap();
        assert_eq!(event.order_id(), Some("A1"));
        let OrderEvent::Created(payload) = event else {
            panic!("expected OrderCreated");
        };
        assert_eq!(payload.product_id.as_deref(), Some("P02"));
        assert_eq!(payload.quantity, Some(10));
    }

    #[test]
    fn test_dispatch_wrong_shape() {
        let env = envelope(event_types::ORDER_ASSIGNED, json!({"orderID": "A1"}));
        assert!(matches!(
            OrderEvent::from_envelope(&env),
            Err(EventError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_dispatch_unknown_type() {
        let env = envelope("ContainerOnShip", json!({"orderID": "A1"}));
        let event = OrderEvent::from_envelope(&env).unwrap();
        assert_eq!(event.event_type(), "ContainerOnShip");
        assert_eq!(event.order_id(), Some("A1"));
    }

    #[test]
    fn test_container_allocated_envelope() {
        let event = OrderEvent::ContainerAllocated(ContainerAllocatedPayload {
            order_id: "A1".to_string(),
            container_id: "c10".to_string(),
        });
        let env = event.to_envelope().unwrap();
        assert_eq!(env.event_type, "OrderContainerAllocated");
        assert_eq!(env.version, "1");
        assert_eq!(env.payload_str("containerID"), Some("c10"));
        assert_eq!(OrderEvent::from_envelope(&env).unwrap(), event);
    }
}
