//! In-process event log.
//!
//! `MemoryLog` behaves like a small broker: topics are created on first use
//! with a fixed number of partitions, keyed records are hashed onto a
//! partition, consumer groups commit positions, and producers acknowledge
//! deliveries from a background task in submission order.
//!
//! Fault injection hooks (`set_reachable`, `fail_next_polls`,
//! `fail_next_deliveries`) let tests drive the error paths of the readers
//! and producers built on top.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use esv_id::{Offset, Partition};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    DeliveryAck, DeliveryHandle, InFlight, InFlightGuard, LogError, LogProducer, LogReader,
    LogTransport, OutboundRecord, Polled, RawRecord, StartPosition, SubscribeOptions,
    SubscriptionCursor,
};

const DEFAULT_ENDPOINT: &str = "memory://local";

/// Handle to an in-process log. Clones share the same log.
#[derive(Debug, Clone)]
pub struct MemoryLog {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    endpoint: String,
    partitions_per_topic: usize,
    state: Mutex<State>,
    appended: Notify,
}

#[derive(Debug)]
struct State {
    topics: HashMap<String, Vec<Vec<StoredRecord>>>,
    committed: HashMap<(String, String), BTreeMap<Partition, Offset>>,
    next_sequence: u64,
    reachable: bool,
    poll_faults: HashMap<String, u32>,
    delivery_faults: u32,
    delivery_delay: Duration,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    /// Global append order, used to interleave partitions deterministically.
    sequence: u64,
    key: Option<String>,
    payload: Bytes,
    timestamp_ms: i64,
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLog {
    /// Creates a log whose topics have a single partition.
    pub fn new() -> Self {
        Self::with_partitions(1)
    }

    /// Creates a log whose topics have `partitions` partitions.
    pub fn with_partitions(partitions: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint: DEFAULT_ENDPOINT.to_string(),
                partitions_per_topic: partitions.max(1),
                state: Mutex::new(State {
                    topics: HashMap::new(),
                    committed: HashMap::new(),
                    next_sequence: 0,
                    reachable: true,
                    poll_faults: HashMap::new(),
                    delivery_faults: 0,
                    delivery_delay: Duration::ZERO,
                }),
                appended: Notify::new(),
            }),
        }
    }

    /// Appends a record directly, bypassing any producer.
    ///
    /// Useful to seed a topic with arbitrary bytes, including malformed
    /// records.
    pub fn append(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: impl Into<Bytes>,
    ) -> (Partition, Offset) {
        self.inner.append(topic, key.map(str::to_string), payload.into())
    }

    /// Simulates the broker going away or coming back.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.lock().reachable = reachable;
    }

    /// Makes the next `count` polls by readers in `group` fail.
    pub fn fail_next_polls(&self, group: &str, count: u32) {
        self.inner
            .lock()
            .poll_faults
            .insert(group.to_string(), count);
    }

    /// Makes the next `count` deliveries fail.
    pub fn fail_next_deliveries(&self, count: u32) {
        self.inner.lock().delivery_faults = count;
    }

    /// Delays every delivery acknowledgement by `delay`.
    pub fn set_delivery_delay(&self, delay: Duration) {
        self.inner.lock().delivery_delay = delay;
    }

    /// Positions committed by `group` for `topic`.
    pub fn committed(&self, group: &str, topic: &str) -> Option<BTreeMap<Partition, Offset>> {
        self.inner
            .lock()
            .committed
            .get(&(group.to_string(), topic.to_string()))
            .cloned()
    }

    /// Total number of records in `topic` across partitions.
    pub fn len(&self, topic: &str) -> usize {
        self.inner
            .lock()
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn partition_for(&self, key: Option<&str>) -> usize {
        match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % self.partitions_per_topic as u64) as usize
            }
            None => 0,
        }
    }

    fn append(&self, topic: &str, key: Option<String>, payload: Bytes) -> (Partition, Offset) {
        let partition = self.partition_for(key.as_deref());
        let position = {
            let mut state = self.lock();
            let sequence = state.next_sequence;
            state.next_sequence += 1;

            let partitions = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| vec![Vec::new(); self.partitions_per_topic]);
            let records = &mut partitions[partition];
            records.push(StoredRecord {
                sequence,
                key,
                payload,
                timestamp_ms: now_millis(),
            });
            (
                Partition::new(partition as i32),
                Offset::new(records.len() as i64 - 1),
            )
        };
        self.appended.notify_waiters();
        position
    }

    fn deliver(&self, record: OutboundRecord) -> Result<DeliveryAck, LogError> {
        {
            let mut state = self.lock();
            if !state.reachable {
                return Err(LogError::Delivery {
                    topic: record.topic,
                    message: "broker unreachable".to_string(),
                });
            }
            if state.delivery_faults > 0 {
                state.delivery_faults -= 1;
                return Err(LogError::Delivery {
                    topic: record.topic,
                    message: "injected delivery failure".to_string(),
                });
            }
        }

        let (partition, offset) = self.append(&record.topic, record.key, record.payload);
        Ok(DeliveryAck {
            topic: record.topic,
            partition,
            offset,
        })
    }

    fn delivery_delay(&self) -> Duration {
        self.lock().delivery_delay
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl LogTransport for MemoryLog {
    type Reader = MemoryReader;
    type Producer = MemoryProducer;

    async fn open(&self, options: SubscribeOptions) -> Result<MemoryReader, LogError> {
        let mut state = self.inner.lock();
        if !state.reachable {
            return Err(LogError::Connection {
                endpoint: self.inner.endpoint.clone(),
                message: "broker unreachable".to_string(),
            });
        }

        state
            .topics
            .entry(options.topic.clone())
            .or_insert_with(|| vec![Vec::new(); self.inner.partitions_per_topic]);

        let positions = match state
            .committed
            .get(&(options.group.clone(), options.topic.clone()))
        {
            Some(committed) => committed.clone(),
            None => match options.start {
                StartPosition::Earliest => BTreeMap::new(),
                StartPosition::Latest => {
                    let partitions = state
                        .topics
                        .get(&options.topic)
                        .map(Vec::as_slice)
                        .unwrap_or_default();
                    partitions
                        .iter()
                        .enumerate()
                        .map(|(p, records)| {
                            (Partition::new(p as i32), Offset::new(records.len() as i64))
                        })
                        .collect()
                }
            },
        };

        debug!(
            topic = %options.topic,
            group = %options.group,
            start = options.start.as_reset_policy(),
            resumed = !positions.is_empty(),
            "Opened memory log reader"
        );

        Ok(MemoryReader {
            log: Arc::clone(&self.inner),
            cursor: SubscriptionCursor::resume(options.topic, options.group, positions),
            commit: options.commit,
            closed: false,
        })
    }

    async fn producer(&self) -> Result<MemoryProducer, LogError> {
        if !self.inner.lock().reachable {
            return Err(LogError::Connection {
                endpoint: self.inner.endpoint.clone(),
                message: "broker unreachable".to_string(),
            });
        }
        Ok(MemoryProducer::spawn(Arc::clone(&self.inner)))
    }
}

/// Reader over a [`MemoryLog`] topic.
#[derive(Debug)]
pub struct MemoryReader {
    log: Arc<Inner>,
    cursor: SubscriptionCursor,
    commit: bool,
    closed: bool,
}

impl MemoryReader {
    /// Takes the next unread record, earliest append first across partitions.
    fn take_next(&mut self, state: &State) -> Option<RawRecord> {
        let partitions = state.topics.get(self.cursor.topic())?;

        let (partition, offset, record) = partitions
            .iter()
            .enumerate()
            .filter_map(|(p, records)| {
                let partition = Partition::new(p as i32);
                let offset = self.cursor.position(partition).unwrap_or(Offset::ZERO);
                records
                    .get(usize::try_from(offset.value()).ok()?)
                    .map(|record| (partition, offset, record))
            })
            .min_by_key(|(_, _, record)| record.sequence)?;

        let raw = RawRecord {
            topic: self.cursor.topic().to_string(),
            partition,
            offset,
            key: record.key.clone(),
            payload: record.payload.clone(),
            timestamp_ms: Some(record.timestamp_ms),
        };
        self.cursor.advance(partition, offset);
        Some(raw)
    }
}

#[async_trait]
impl LogReader for MemoryReader {
    fn cursor(&self) -> &SubscriptionCursor {
        &self.cursor
    }

    async fn poll(&mut self, max_wait: Duration) -> Result<Polled, LogError> {
        if self.closed {
            return Err(LogError::Closed {
                topic: self.cursor.topic().to_string(),
            });
        }

        let deadline = Instant::now() + max_wait;
        let log = Arc::clone(&self.log);
        loop {
            let appended = log.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            {
                let mut state = log.lock();
                if !state.reachable {
                    return Err(LogError::Transport {
                        topic: self.cursor.topic().to_string(),
                        message: "broker unreachable".to_string(),
                    });
                }
                if let Some(faults) = state.poll_faults.get_mut(self.cursor.group()) {
                    if *faults > 0 {
                        *faults -= 1;
                        return Err(LogError::Transport {
                            topic: self.cursor.topic().to_string(),
                            message: "injected poll failure".to_string(),
                        });
                    }
                }
                if let Some(record) = self.take_next(&state) {
                    return Ok(Polled::Record(record));
                }
            }

            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(Polled::Empty);
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if self.commit && !self.cursor.positions().is_empty() {
            let mut state = self.log.lock();
            state.committed.insert(
                (
                    self.cursor.group().to_string(),
                    self.cursor.topic().to_string(),
                ),
                self.cursor.positions().clone(),
            );
        }

        debug!(
            topic = %self.cursor.topic(),
            group = %self.cursor.group(),
            consumed = self.cursor.consumed(),
            committed = self.commit,
            "Closed memory log reader"
        );
    }
}

impl Drop for MemoryReader {
    fn drop(&mut self) {
        self.close();
    }
}

type Submission = (
    OutboundRecord,
    oneshot::Sender<Result<DeliveryAck, LogError>>,
    InFlightGuard,
);

/// Producer for a [`MemoryLog`].
///
/// Records are delivered by a background task in submission order, so
/// `send` must be called from within a tokio runtime.
#[derive(Debug)]
pub struct MemoryProducer {
    tx: mpsc::UnboundedSender<Submission>,
    in_flight: InFlight,
}

impl MemoryProducer {
    fn spawn(log: Arc<Inner>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Submission>();

        tokio::spawn(async move {
            while let Some((record, reply, guard)) = rx.recv().await {
                let delay = log.delivery_delay();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                let result = log.deliver(record);
                if let Err(err) = &result {
                    warn!(error = %err, "Memory log delivery failed");
                }
                let _ = reply.send(result);
                drop(guard);
            }
        });

        Self {
            tx,
            in_flight: InFlight::new(),
        }
    }

    /// Number of records submitted but not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }
}

#[async_trait]
impl LogProducer for MemoryProducer {
    fn send(&self, record: OutboundRecord) -> DeliveryHandle {
        let (reply, handle) = DeliveryHandle::channel(record.topic.clone());
        let guard = self.in_flight.begin();

        if let Err(mpsc::error::SendError((record, reply, guard))) =
            self.tx.send((record, reply, guard))
        {
            let _ = reply.send(Err(LogError::Delivery {
                topic: record.topic,
                message: "producer task stopped".to_string(),
            }));
            drop(guard);
        }
        handle
    }

    async fn flush(&self, timeout: Duration) -> usize {
        self.in_flight.wait_settled(timeout).await
    }
}
