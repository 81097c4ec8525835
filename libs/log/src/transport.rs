//! Transport traits and delivery tracking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;

use crate::{DeliveryAck, LogError, OutboundRecord, Polled, SubscribeOptions, SubscriptionCursor};

/// Opens readers and producers against one log deployment.
#[async_trait]
pub trait LogTransport: Send + Sync {
    type Reader: LogReader;
    type Producer: LogProducer;

    /// Opens a reader with its own cursor.
    ///
    /// Fails with [`LogError::Connection`] if the log is unreachable.
    async fn open(&self, options: SubscribeOptions) -> Result<Self::Reader, LogError>;

    /// Creates a producer.
    async fn producer(&self) -> Result<Self::Producer, LogError>;
}

/// A pull-based subscription to one topic.
#[async_trait]
pub trait LogReader: Send {
    fn cursor(&self) -> &SubscriptionCursor;

    /// Waits up to `max_wait` for the next record.
    ///
    /// Returns [`Polled::Empty`] when nothing arrived in time and
    /// [`LogError::Transport`] when the log reported an error for this poll.
    async fn poll(&mut self, max_wait: Duration) -> Result<Polled, LogError>;

    /// Releases transport resources. Calling it again has no effect.
    fn close(&mut self);
}

/// Appends records to the log.
#[async_trait]
pub trait LogProducer: Send + Sync {
    /// Submits a record. Delivery completes in the background.
    fn send(&self, record: OutboundRecord) -> DeliveryHandle;

    /// Waits until every submitted record was acknowledged or failed, or the
    /// timeout elapses. Returns the number still unacknowledged.
    async fn flush(&self, timeout: Duration) -> usize;
}

/// Completion signal for one submitted record.
#[derive(Debug)]
pub struct DeliveryHandle {
    topic: String,
    rx: oneshot::Receiver<Result<DeliveryAck, LogError>>,
}

impl DeliveryHandle {
    /// Creates a pending handle and the sender that completes it.
    pub fn channel(
        topic: impl Into<String>,
    ) -> (oneshot::Sender<Result<DeliveryAck, LogError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                topic: topic.into(),
                rx,
            },
        )
    }

    /// Creates a handle that is already complete.
    pub fn ready(topic: impl Into<String>, result: Result<DeliveryAck, LogError>) -> Self {
        let (tx, handle) = Self::channel(topic);
        let _ = tx.send(result);
        handle
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Waits for the delivery report.
    pub async fn wait(self) -> Result<DeliveryAck, LogError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(LogError::Delivery {
                topic: self.topic,
                message: "producer dropped before reporting delivery".to_string(),
            }),
        }
    }
}

/// Counts records submitted but not yet acknowledged.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    inner: Arc<InFlightInner>,
}

#[derive(Debug, Default)]
struct InFlightInner {
    count: AtomicUsize,
    settled: Notify,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks one record as in flight until the guard is dropped.
    pub fn begin(&self) -> InFlightGuard {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Waits until nothing is in flight or `timeout` elapses.
    ///
    /// Returns the number of records still in flight.
    pub async fn wait_settled(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let settled = self.inner.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();

            let remaining = self.count();
            if remaining == 0 {
                return 0;
            }

            if tokio::time::timeout_at(deadline, settled).await.is_err() {
                return self.count();
            }
        }
    }
}

/// Releases one in-flight slot on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    inner: Arc<InFlightInner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.count.fetch_sub(1, Ordering::SeqCst);
        self.inner.settled.notify_waiters();
    }
}
