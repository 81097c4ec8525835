//! Error types for event decoding.

use thiserror::Error;

/// Errors produced while decoding or encoding event records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The record body is not well-formed JSON or not a JSON object.
    #[error("malformed event record: {0}")]
    Malformed(String),

    /// A required top-level field is absent.
    #[error("event record missing required field '{0}'")]
    MissingField(&'static str),

    /// A top-level field is present but has the wrong JSON type.
    #[error("event field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    /// The payload does not have the shape its event type requires.
    #[error("invalid {event_type} payload: {message}")]
    InvalidPayload { event_type: String, message: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
