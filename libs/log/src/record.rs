//! Records, subscription options and cursors.

use std::collections::BTreeMap;

use bytes::Bytes;
use esv_id::{Offset, Partition};

/// A record as read from the log, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub topic: String,
    pub partition: Partition,
    pub offset: Offset,
    pub key: Option<String>,
    pub payload: Bytes,
    /// Broker append time in milliseconds, when the transport reports one.
    pub timestamp_ms: Option<i64>,
}

/// A record to append to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Bytes,
}

impl OutboundRecord {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            payload: payload.into(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Acknowledgement that a record was appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAck {
    pub topic: String,
    pub partition: Partition,
    pub offset: Offset,
}

/// Where a consumer group without a committed position starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPosition {
    /// The oldest record still retained.
    #[default]
    Earliest,
    /// Only records appended after the subscription is opened.
    Latest,
}

impl StartPosition {
    /// The Kafka `auto.offset.reset` value for this position.
    pub fn as_reset_policy(&self) -> &'static str {
        match self {
            StartPosition::Earliest => "earliest",
            StartPosition::Latest => "latest",
        }
    }
}

/// Parameters for opening a reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub topic: String,
    pub group: String,
    pub start: StartPosition,
    /// Commit the cursor back to the group when the reader closes.
    pub commit: bool,
}

impl SubscribeOptions {
    pub fn new(topic: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            group: group.into(),
            start: StartPosition::Earliest,
            commit: true,
        }
    }

    pub fn start(mut self, start: StartPosition) -> Self {
        self.start = start;
        self
    }

    pub fn commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }
}

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled {
    Record(RawRecord),
    /// Nothing arrived within the poll's wait. Not an error.
    Empty,
}

/// The read position of one reader.
///
/// Positions are the next offset to read per partition and only ever move
/// forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionCursor {
    topic: String,
    group: String,
    positions: BTreeMap<Partition, Offset>,
    consumed: u64,
}

impl SubscriptionCursor {
    pub fn new(topic: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            group: group.into(),
            positions: BTreeMap::new(),
            consumed: 0,
        }
    }

    /// Creates a cursor resuming from known positions.
    pub fn resume(
        topic: impl Into<String>,
        group: impl Into<String>,
        positions: BTreeMap<Partition, Offset>,
    ) -> Self {
        Self {
            positions,
            ..Self::new(topic, group)
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Next offset to read in `partition`, if anything was consumed or resumed.
    pub fn position(&self, partition: Partition) -> Option<Offset> {
        self.positions.get(&partition).copied()
    }

    pub fn positions(&self) -> &BTreeMap<Partition, Offset> {
        &self.positions
    }

    /// Number of records consumed through this cursor.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Records that `offset` in `partition` was consumed.
    ///
    /// A redelivered offset behind the current position is counted but does
    /// not move the cursor back.
    pub fn advance(&mut self, partition: Partition, offset: Offset) {
        self.consumed += 1;
        let next = offset.next();
        let position = self.positions.entry(partition).or_insert(next);
        if *position < next {
            *position = next;
        }
    }
}
