//! Exhaustive history scan for one transaction.
//!
//! A log has no natural end for a streaming reader, so "the whole log" is
//! approximated by idleness: the scan stops after `idle_timeout` passes with
//! no record at all. On a busy topic this can run long; on a slow broker it
//! can stop before the true end. Callers that need a hard bound should pick
//! a conservative idle timeout.

use std::time::Duration;

use esv_events::EventEnvelope;
use esv_id::RunId;
use esv_log::{LogError, LogReader, LogTransport, StartPosition, SubscribeOptions};
use tokio::time::Instant;
use tracing::{info, instrument};

use crate::pipeline::{pull, Pulled};
use crate::{CorrelationKey, WaitStats};

/// Where and how long to scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryOptions {
    pub topic: String,

    /// Prefix for the throwaway consumer group; a run id is appended.
    pub group_prefix: String,

    /// Quiet period that ends the scan.
    pub idle_timeout: Duration,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            topic: "orders".to_string(),
            group_prefix: "esv-orders-reload".to_string(),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Collects every correlated event `reader` yields until it goes idle.
///
/// The idle clock restarts on every record, correlated or not, including
/// malformed ones. A transport error that persists past `idle_timeout` ends
/// the scan like silence does.
pub async fn collect_all<R>(
    reader: &mut R,
    key: &CorrelationKey,
    idle_timeout: Duration,
) -> Vec<EventEnvelope>
where
    R: LogReader + ?Sized,
{
    let mut stats = WaitStats::default();
    let mut events = Vec::new();
    let mut last_activity = Instant::now();

    loop {
        let idle_for = last_activity.elapsed();
        if idle_for >= idle_timeout {
            break;
        }

        let transport_errors = stats.transport_errors;
        match pull(reader, idle_timeout - idle_for, &mut stats).await {
            Pulled::Event(envelope) => {
                last_activity = Instant::now();
                if key.matches(&envelope) {
                    events.push(envelope);
                } else {
                    stats.uncorrelated += 1;
                }
            }
            // A malformed record is activity; a transport fault is not.
            Pulled::Absorbed if stats.transport_errors == transport_errors => {
                last_activity = Instant::now()
            }
            Pulled::Absorbed | Pulled::Empty => {}
        }
    }

    info!(
        key = %key,
        collected = events.len(),
        records = stats.records,
        decode_errors = stats.decode_errors,
        "History scan finished"
    );
    events
}

/// Replays a topic from the beginning for one transaction.
///
/// Each `collect` uses a consumer group unique to that call which never
/// commits, so repeated scans see the same history and the live group's
/// position is untouched.
#[derive(Debug, Clone, Default)]
pub struct HistoryCollector {
    options: HistoryOptions,
}

impl HistoryCollector {
    pub fn new(options: HistoryOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &HistoryOptions {
        &self.options
    }

    #[instrument(skip_all, fields(topic = %self.options.topic, key = %key))]
    pub async fn collect<T>(
        &self,
        transport: &T,
        key: &CorrelationKey,
    ) -> Result<Vec<EventEnvelope>, LogError>
    where
        T: LogTransport + ?Sized,
    {
        let group = RunId::new().consumer_group(&self.options.group_prefix);
        let mut reader = transport
            .open(
                SubscribeOptions::new(&self.options.topic, &group)
                    .start(StartPosition::Earliest)
                    .commit(false),
            )
            .await?;

        let events = collect_all(&mut reader, key, self.options.idle_timeout).await;
        reader.close();
        Ok(events)
    }
}
