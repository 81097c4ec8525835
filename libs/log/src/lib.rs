//! # esv-log
//!
//! Transport layer for a named-topic, partitioned, at-least-once append log.
//!
//! ## Model
//!
//! - A [`LogTransport`] opens readers and producers.
//! - A [`LogReader`] owns one [`SubscriptionCursor`]. Readers opened with
//!   different consumer groups never share a position, even on the same
//!   topic. A group that has committed a position resumes from it; otherwise
//!   the reader starts at its [`StartPosition`].
//! - A [`LogProducer`] appends records asynchronously. Each send returns a
//!   [`DeliveryHandle`]; `flush` waits for outstanding acknowledgements.
//!
//! Readers are released on drop, so a reader scoped to one verification run
//! is closed on every exit path.
//!
//! ## Backends
//!
//! - [`MemoryLog`]: in-process log with fault injection, used by tests and
//!   local dry runs.
//! - `KafkaTransport` (feature `kafka`): built on `rdkafka`.

mod error;
mod memory;
mod record;
mod transport;

#[cfg(feature = "kafka")]
mod kafka;

pub use error::LogError;
pub use memory::{MemoryLog, MemoryProducer, MemoryReader};
pub use record::*;
pub use transport::*;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaProducer, KafkaReader, KafkaTransport};
