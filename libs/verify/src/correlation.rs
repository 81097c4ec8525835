//! Correlation of events to the transaction under test.

use std::fmt;

use esv_events::{EventEnvelope, ORDER_ID_FIELD};
use serde_json::Value;

use crate::CorrelationError;

const PAYLOAD_PREFIX: &str = "payload.";

/// A payload field path and the value it must hold.
///
/// Paths address the payload: `orderID`, `payload.orderID` and
/// `voyage.voyageID` are valid; anything deeper is rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationKey {
    field: String,
    subfield: Option<String>,
    expected: String,
}

impl CorrelationKey {
    pub fn new(path: &str, expected: impl Into<String>) -> Result<Self, CorrelationError> {
        let invalid = || CorrelationError::InvalidPath(path.to_string());

        let relative = path.strip_prefix(PAYLOAD_PREFIX).unwrap_or(path);
        let mut segments = relative.split('.');
        let field = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let subfield = match segments.next() {
            Some(s) if !s.is_empty() => Some(s.to_string()),
            Some(_) => return Err(invalid()),
            None => None,
        };
        if segments.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            field: field.to_string(),
            subfield,
            expected: expected.into(),
        })
    }

    /// Key matching `payload.orderID == order_id`.
    pub fn order_id(order_id: impl Into<String>) -> Self {
        Self {
            field: ORDER_ID_FIELD.to_string(),
            subfield: None,
            expected: order_id.into(),
        }
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    /// Looks up the keyed field in an envelope's payload.
    pub fn lookup<'a>(&self, envelope: &'a EventEnvelope) -> Option<&'a Value> {
        let value = envelope.payload.get(&self.field)?;
        match &self.subfield {
            Some(subfield) => value.as_object()?.get(subfield),
            None => Some(value),
        }
    }

    /// Returns true if the envelope belongs to this transaction.
    ///
    /// Strings compare directly; numbers and booleans by their JSON text.
    /// Absent fields, null, objects and arrays never match.
    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        match self.lookup(envelope) {
            Some(Value::String(s)) => *s == self.expected,
            Some(Value::Number(n)) => n.to_string() == self.expected,
            Some(Value::Bool(b)) => b.to_string() == self.expected,
            _ => false,
        }
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", PAYLOAD_PREFIX, self.field)?;
        if let Some(subfield) = &self.subfield {
            write!(f, ".{subfield}")?;
        }
        write!(f, " == {}", self.expected)
    }
}

/// Returns true if `envelope` matches `key`.
pub fn matches(envelope: &EventEnvelope, key: &CorrelationKey) -> bool {
    key.matches(envelope)
}
