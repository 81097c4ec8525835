//! Transport error types.

use thiserror::Error;

/// Errors reported by the event log transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogError {
    /// The transport could not be reached when opening a reader or producer.
    #[error("failed to connect to event log at {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    /// A poll reported an error. Transient: the caller should retry.
    #[error("transport error on topic {topic}: {message}")]
    Transport { topic: String, message: String },

    /// A published record was not acknowledged.
    #[error("delivery to topic {topic} failed: {message}")]
    Delivery { topic: String, message: String },

    /// The reader was used after `close`.
    #[error("subscription to topic {topic} is closed")]
    Closed { topic: String },
}

impl LogError {
    /// Returns true if the operation may succeed when retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, LogError::Transport { .. })
    }
}
