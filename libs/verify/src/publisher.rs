//! Publishing synthetic events onto the log.

use std::time::Duration;

use esv_events::{
    encode, ContainerAllocatedPayload, EventEnvelope, EventError, OrderEvent, ORDER_ID_FIELD,
};
use esv_log::{DeliveryAck, DeliveryHandle, LogProducer, OutboundRecord};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::DeliveryError;

/// Publishes envelopes to one topic.
///
/// Records are keyed by the payload `orderID` when there is one, so all
/// events of an order land on the same partition and keep their order.
#[derive(Debug)]
pub struct EventPublisher<P> {
    producer: P,
    topic: String,
}

impl<P: LogProducer> EventPublisher<P> {
    pub fn new(producer: P, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Encodes and enqueues an envelope. Returns once the record is queued.
    pub fn publish(&self, envelope: &EventEnvelope) -> Result<PendingDelivery, DeliveryError> {
        let payload = encode(envelope)?;
        let mut record = OutboundRecord::new(&self.topic, payload);
        if let Some(order_id) = envelope.payload_str(ORDER_ID_FIELD) {
            record = record.with_key(order_id);
        }

        debug!(
            topic = %self.topic,
            event_type = %envelope.event_type,
            key = ?record.key,
            "Publishing event"
        );

        Ok(PendingDelivery {
            event_type: envelope.event_type.clone(),
            handle: self.producer.send(record),
        })
    }

    /// Publishes and waits for the delivery report.
    pub async fn publish_and_wait(
        &self,
        envelope: &EventEnvelope,
    ) -> Result<DeliveryAck, DeliveryError> {
        self.publish(envelope)?.wait().await
    }

    /// Waits up to `timeout` for outstanding deliveries.
    ///
    /// Returns how many were still unacknowledged when the wait ended.
    pub async fn flush(&self, timeout: Duration) -> usize {
        let outstanding = self.producer.flush(timeout).await;
        if outstanding > 0 {
            warn!(
                topic = %self.topic,
                outstanding,
                "Flush timed out with deliveries outstanding"
            );
        }
        outstanding
    }
}

/// Builds the `OrderContainerAllocated` event the container service would
/// emit.
pub fn container_allocated(
    order_id: impl Into<String>,
    container_id: impl Into<String>,
) -> Result<EventEnvelope, EventError> {
    OrderEvent::ContainerAllocated(ContainerAllocatedPayload {
        order_id: order_id.into(),
        container_id: container_id.into(),
    })
    .to_envelope()
}

/// A record that has been enqueued but not yet acknowledged.
#[derive(Debug)]
pub struct PendingDelivery {
    event_type: String,
    handle: DeliveryHandle,
}

impl PendingDelivery {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Resolves the delivery report and logs it.
    pub async fn wait(self) -> Result<DeliveryAck, DeliveryError> {
        match self.handle.wait().await {
            Ok(ack) => {
                info!(
                    event_type = %self.event_type,
                    topic = %ack.topic,
                    partition = %ack.partition,
                    offset = %ack.offset,
                    "Event delivered"
                );
                Ok(ack)
            }
            Err(err) => {
                warn!(event_type = %self.event_type, error = %err, "Event delivery failed");
                Err(err.into())
            }
        }
    }

    /// Like [`wait`](Self::wait), but gives up at `deadline`.
    ///
    /// A report that is already available is returned even when the
    /// deadline has passed.
    pub async fn wait_until(self, deadline: Instant) -> Result<DeliveryAck, DeliveryError> {
        let event_type = self.event_type.clone();
        match tokio::time::timeout_at(deadline, self.wait()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(event_type = %event_type, "No delivery report before the deadline");
                Err(DeliveryError::Unacknowledged { event_type })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esv_events::decode;
    use esv_events::event_types::ORDER_CONTAINER_ALLOCATED;
    use esv_log::{LogError, LogReader, LogTransport, MemoryLog, Polled, SubscribeOptions};

    const TOPIC: &str = "orders";

    #[test]
    fn test_container_allocated_event() {
        let envelope = container_allocated("A1", "c10").unwrap();
        assert_eq!(envelope.event_type, ORDER_CONTAINER_ALLOCATED);
        assert_eq!(envelope.payload_str("orderID"), Some("A1"));
        assert_eq!(envelope.payload_str("containerID"), Some("c10"));
        assert!(envelope.timestamp > 0);
    }

    #[tokio::test]
    async fn test_published_event_is_readable_from_the_start() {
        let log = MemoryLog::new();
        let publisher = EventPublisher::new(log.producer().await.unwrap(), TOPIC);

        let envelope = container_allocated("A1", "c10").unwrap();
        let ack = publisher.publish_and_wait(&envelope).await.unwrap();
        assert_eq!(ack.topic, TOPIC);

        let mut reader = log
            .open(SubscribeOptions::new(TOPIC, "fresh").commit(false))
            .await
            .unwrap();
        let Polled::Record(record) = reader.poll(Duration::from_secs(1)).await.unwrap() else {
            panic!("expected a record");
        };
        assert_eq!(record.key.as_deref(), Some("A1"));
        assert_eq!(decode(&record.payload).unwrap(), envelope);
    }

    #[tokio::test]
    async fn test_flush_waits_for_outstanding_deliveries() {
        let log = MemoryLog::new();
        log.set_delivery_delay(Duration::from_millis(50));
        let publisher = EventPublisher::new(log.producer().await.unwrap(), TOPIC);

        let first = publisher
            .publish(&container_allocated("A1", "c1").unwrap())
            .unwrap();
        let second = publisher
            .publish(&container_allocated("A1", "c2").unwrap())
            .unwrap();

        assert_eq!(publisher.flush(Duration::from_secs(5)).await, 0);
        assert_eq!(log.len(TOPIC), 2);

        let first = first.wait().await.unwrap();
        let second = second.wait().await.unwrap();
        assert_eq!(first.partition, second.partition);
        assert!(first.offset < second.offset);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_reported() {
        let log = MemoryLog::new();
        log.fail_next_deliveries(1);
        let publisher = EventPublisher::new(log.producer().await.unwrap(), TOPIC);

        let err = publisher
            .publish_and_wait(&container_allocated("A1", "c10").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::Log(LogError::Delivery { .. })
        ));
        assert!(log.is_empty(TOPIC));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_gives_up_at_the_deadline() {
        let log = MemoryLog::new();
        log.set_delivery_delay(Duration::from_secs(120));
        let publisher = EventPublisher::new(log.producer().await.unwrap(), TOPIC);

        let start = Instant::now();
        let deadline = start + Duration::from_millis(100);
        let pending = publisher
            .publish(&container_allocated("A1", "c10").unwrap())
            .unwrap();

        assert_eq!(publisher.flush(Duration::from_millis(100)).await, 1);
        let err = pending.wait_until(deadline).await.unwrap_err();

        assert_eq!(
            err,
            DeliveryError::Unacknowledged {
                event_type: ORDER_CONTAINER_ALLOCATED.to_string()
            }
        );
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_wait_until_returns_a_settled_report_after_the_deadline() {
        let log = MemoryLog::new();
        let publisher = EventPublisher::new(log.producer().await.unwrap(), TOPIC);

        let pending = publisher
            .publish(&container_allocated("A1", "c10").unwrap())
            .unwrap();
        assert_eq!(publisher.flush(Duration::from_secs(5)).await, 0);

        let ack = pending.wait_until(Instant::now()).await.unwrap();
        assert_eq!(ack.topic, TOPIC);
    }
}
