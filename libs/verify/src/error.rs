//! Error types for verification runs.

use esv_events::EventError;
use esv_log::LogError;
use thiserror::Error;

/// A correlation key could not be built.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("invalid correlation field path '{0}': expected 'field' or 'field.subfield'")]
    InvalidPath(String),
}

/// Publishing a synthetic event failed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeliveryError {
    /// The envelope could not be encoded.
    #[error("failed to encode event: {0}")]
    Encode(#[from] EventError),

    /// The log did not acknowledge the record.
    #[error(transparent)]
    Log(#[from] LogError),

    /// No delivery report arrived before the flush deadline.
    #[error("{event_type} was not acknowledged before the flush deadline")]
    Unacknowledged { event_type: String },
}

/// The order command service rejected or failed a request.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid order service address '{0}'")]
    InvalidAddress(String),

    #[error("order service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("order service returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("order service response has no orderID")]
    MissingOrderId,
}

/// A scenario could not run to a verdict.
///
/// A timed-out sequence is not an error; it is reported in the
/// [`ScenarioReport`](crate::ScenarioReport).
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("event log unavailable: {0}")]
    Log(#[from] LogError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("failed to publish simulated event: {0}")]
    Delivery(#[from] DeliveryError),
}
