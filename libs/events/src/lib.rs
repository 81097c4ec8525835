//! # esv-events
//!
//! Event envelope and wire codec for the order event log.
//!
//! ## Wire Format
//!
//! Every record on the log is a UTF-8 JSON object:
//!
//! ```json
//! {"timestamp": 1554754390, "type": "OrderCreated", "version": "1",
//!  "payload": {"orderID": "A1", "productID": "P02"}}
//! ```
//!
//! `type` and `payload` are required. Unknown top-level fields are ignored so
//! newer producers can add metadata without breaking older readers.
//!
//! ## Typed Events
//!
//! The envelope itself is type-agnostic: correlation and sequencing only look
//! at `type` and payload fields. [`OrderEvent`] is the typed view used where
//! the payload shape matters (building synthetic events, reading a voyage id).

mod envelope;
mod error;
mod types;

pub use envelope::*;
pub use error::EventError;
pub use types::*;
