//! # esv-verify
//!
//! Verifies that a command against an event-sourced service produces the
//! expected, causally ordered events on the shared event log.
//!
//! ## Pipeline
//!
//! ```text
//! LogReader::poll ─► decode ─► CorrelationKey::matches ─► SequenceWaiter
//! ```
//!
//! Each stage is sequential within one reader. Malformed records and
//! transient transport errors are logged and skipped; events for other
//! transactions are discarded; only connection failures and the overall
//! deadline end a run early.
//!
//! ## Modules
//!
//! - `correlation`: which events belong to the transaction under test
//! - `waiter`: the expected-sequence state machine and its bounded poll loop
//! - `history`: exhaustive scan of the log for one transaction
//! - `publisher`: publishing synthetic events with delivery reports
//! - `commands`: the HTTP command client for the order service
//! - `scenario`: the order lifecycle check tying everything together

pub mod commands;
pub mod correlation;
pub mod error;
pub mod history;
pub mod publisher;
pub mod scenario;
pub mod waiter;

mod pipeline;

pub use commands::{HttpOrderCommands, OrderCommands};
pub use correlation::{matches, CorrelationKey};
pub use error::{CommandError, CorrelationError, DeliveryError, ScenarioError};
pub use history::{collect_all, HistoryCollector, HistoryOptions};
pub use pipeline::WaitStats;
pub use publisher::{container_allocated, EventPublisher, PendingDelivery};
pub use scenario::{Allocation, OrderLifecycleScenario, ScenarioConfig, ScenarioReport};
pub use waiter::{SequenceWaiter, Transition, VerificationResult, WaitOptions, WaiterState};
