//! # esv-id
//!
//! Identifier and position types shared by the esv crates.
//!
//! ## Run IDs
//!
//! Every verification run gets a `RunId` of the form `run_{ulid}`. It is used
//! to derive consumer-group names that no other run has ever committed an
//! offset for, which gives history readers a guaranteed fresh cursor.
//!
//! ## Log positions
//!
//! `Partition` and `Offset` are plain integer newtypes mirroring the
//! partition/offset addressing of a partitioned append log.

mod macros;
mod types;

pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
