//! Poll → decode step shared by the waiter and the history scan.

use std::time::Duration;

use esv_events::EventEnvelope;
use esv_log::{LogReader, Polled};
use serde::Serialize;
use tracing::{trace, warn};

/// Pause after a transport error before polling again.
const TRANSPORT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Counters for one reader loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WaitStats {
    pub polls: u64,
    pub records: u64,
    pub empty_polls: u64,
    pub decode_errors: u64,
    pub transport_errors: u64,
    pub uncorrelated: u64,
}

pub(crate) enum Pulled {
    Event(EventEnvelope),
    /// A malformed record or transport error was logged and absorbed.
    Absorbed,
    Empty,
}

/// Polls once and decodes the record, absorbing recoverable faults.
pub(crate) async fn pull<R>(reader: &mut R, wait: Duration, stats: &mut WaitStats) -> Pulled
where
    R: LogReader + ?Sized,
{
    stats.polls += 1;

    let record = match reader.poll(wait).await {
        Ok(Polled::Record(record)) => record,
        Ok(Polled::Empty) => {
            stats.empty_polls += 1;
            return Pulled::Empty;
        }
        Err(err) => {
            stats.transport_errors += 1;
            warn!(
                error = %err,
                topic = %reader.cursor().topic(),
                group = %reader.cursor().group(),
                "Event log poll failed, retrying"
            );
            tokio::time::sleep(TRANSPORT_RETRY_BACKOFF.min(wait)).await;
            return Pulled::Absorbed;
        }
    };

    stats.records += 1;
    match esv_events::decode(&record.payload) {
        Ok(envelope) => {
            trace!(
                partition = %record.partition,
                offset = %record.offset,
                event_type = %envelope.event_type,
                "Decoded event"
            );
            Pulled::Event(envelope)
        }
        Err(err) => {
            stats.decode_errors += 1;
            warn!(
                error = %err,
                partition = %record.partition,
                offset = %record.offset,
                "Skipping malformed event record"
            );
            Pulled::Absorbed
        }
    }
}
