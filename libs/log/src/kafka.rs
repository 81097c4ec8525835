//! Kafka backend built on `rdkafka`.
//!
//! Readers wrap a `StreamConsumer` subscribed to one topic under one consumer
//! group; `StartPosition` maps to `auto.offset.reset` and the `commit` flag to
//! `enable.auto.commit`. Producers wrap a `FutureProducer`; each send is
//! enqueued synchronously so per-partition order follows submission order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use esv_id::{Offset, Partition};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{ClientConfig, Message};
use tracing::{debug, info, warn};

use crate::{
    DeliveryAck, DeliveryHandle, InFlight, LogError, LogProducer, LogReader, LogTransport,
    OutboundRecord, Polled, RawRecord, SubscribeOptions, SubscriptionCursor,
};

/// Default wait for broker metadata when checking reachability.
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport for a Kafka cluster.
#[derive(Clone)]
pub struct KafkaTransport {
    brokers: String,
    client_config: ClientConfig,
    metadata_timeout: Duration,
}

impl std::fmt::Debug for KafkaTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaTransport")
            .field("brokers", &self.brokers)
            .finish()
    }
}

impl KafkaTransport {
    /// Creates a transport for a comma-separated broker list.
    pub fn new(brokers: impl Into<String>) -> Self {
        let brokers = brokers.into();
        let mut client_config = ClientConfig::new();
        client_config.set("bootstrap.servers", &brokers);
        Self {
            brokers,
            client_config,
            metadata_timeout: METADATA_TIMEOUT,
        }
    }

    /// Bounds the reachability check done when opening readers and producers.
    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    /// Sets an additional librdkafka property (credentials, TLS, ...).
    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.client_config.set(key, value);
        self
    }

    fn connection_error(&self, err: impl std::fmt::Display) -> LogError {
        LogError::Connection {
            endpoint: self.brokers.clone(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl LogTransport for KafkaTransport {
    type Reader = KafkaReader;
    type Producer = KafkaProducer;

    async fn open(&self, options: SubscribeOptions) -> Result<KafkaReader, LogError> {
        let mut config = self.client_config.clone();
        config
            .set("group.id", &options.group)
            .set("auto.offset.reset", options.start.as_reset_policy())
            .set(
                "enable.auto.commit",
                if options.commit { "true" } else { "false" },
            )
            .set("enable.partition.eof", "false");

        let consumer: StreamConsumer = config
            .create()
            .map_err(|e| self.connection_error(e))?;
        let consumer = Arc::new(consumer);

        let probe = Arc::clone(&consumer);
        let topic = options.topic.clone();
        let timeout = self.metadata_timeout;
        tokio::task::spawn_blocking(move || {
            probe
                .fetch_metadata(Some(&topic), timeout)
                .map(|_| ())
        })
        .await
        .map_err(|e| self.connection_error(e))?
        .map_err(|e| self.connection_error(e))?;

        consumer
            .subscribe(&[options.topic.as_str()])
            .map_err(|e| self.connection_error(e))?;

        info!(
            brokers = %self.brokers,
            topic = %options.topic,
            group = %options.group,
            start = options.start.as_reset_policy(),
            "Subscribed to Kafka topic"
        );

        Ok(KafkaReader {
            consumer,
            cursor: SubscriptionCursor::new(options.topic, options.group),
            commit: options.commit,
            closed: false,
        })
    }

    async fn producer(&self) -> Result<KafkaProducer, LogError> {
        let producer: FutureProducer = self
            .client_config
            .create()
            .map_err(|e| self.connection_error(e))?;

        let probe = producer.clone();
        let timeout = self.metadata_timeout;
        tokio::task::spawn_blocking(move || {
            probe
                .client()
                .fetch_metadata(None, timeout)
                .map(|_| ())
        })
        .await
        .map_err(|e| self.connection_error(e))?
        .map_err(|e| self.connection_error(e))?;

        Ok(KafkaProducer {
            producer,
            in_flight: InFlight::new(),
        })
    }
}

/// Reader over one Kafka topic.
pub struct KafkaReader {
    consumer: Arc<StreamConsumer>,
    cursor: SubscriptionCursor,
    commit: bool,
    closed: bool,
}

#[async_trait]
impl LogReader for KafkaReader {
    fn cursor(&self) -> &SubscriptionCursor {
        &self.cursor
    }

    async fn poll(&mut self, max_wait: Duration) -> Result<Polled, LogError> {
        if self.closed {
            return Err(LogError::Closed {
                topic: self.cursor.topic().to_string(),
            });
        }

        let record = match tokio::time::timeout(max_wait, self.consumer.recv()).await {
            Err(_) => return Ok(Polled::Empty),
            Ok(Err(err)) => {
                return Err(LogError::Transport {
                    topic: self.cursor.topic().to_string(),
                    message: err.to_string(),
                })
            }
            Ok(Ok(message)) => RawRecord {
                topic: message.topic().to_string(),
                partition: Partition::new(message.partition()),
                offset: Offset::new(message.offset()),
                key: message
                    .key()
                    .map(|k| String::from_utf8_lossy(k).into_owned()),
                payload: Bytes::copy_from_slice(message.payload().unwrap_or_default()),
                timestamp_ms: message.timestamp().to_millis(),
            },
        };

        self.cursor.advance(record.partition, record.offset);
        Ok(Polled::Record(record))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if self.commit && self.cursor.consumed() > 0 {
            if let Err(err) = self.consumer.commit_consumer_state(CommitMode::Sync) {
                warn!(
                    error = %err,
                    group = %self.cursor.group(),
                    "Failed to commit consumer position on close"
                );
            }
        }
        self.consumer.unsubscribe();

        debug!(
            topic = %self.cursor.topic(),
            group = %self.cursor.group(),
            consumed = self.cursor.consumed(),
            "Closed Kafka reader"
        );
    }
}

impl Drop for KafkaReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// Producer for a Kafka cluster.
pub struct KafkaProducer {
    producer: FutureProducer,
    in_flight: InFlight,
}

#[async_trait]
impl LogProducer for KafkaProducer {
    fn send(&self, record: OutboundRecord) -> DeliveryHandle {
        let topic = record.topic.clone();
        let mut future_record =
            FutureRecord::<str, [u8]>::to(&record.topic).payload(record.payload.as_ref());
        if let Some(key) = record.key.as_deref() {
            future_record = future_record.key(key);
        }

        let delivery = match self.producer.send_result(future_record) {
            Ok(delivery) => delivery,
            Err((err, _)) => {
                return DeliveryHandle::ready(
                    topic.clone(),
                    Err(LogError::Delivery {
                        topic,
                        message: err.to_string(),
                    }),
                )
            }
        };

        let (reply, handle) = DeliveryHandle::channel(topic.clone());
        let guard = self.in_flight.begin();
        tokio::spawn(async move {
            let result = match delivery.await {
                Ok(Ok((partition, offset))) => Ok(DeliveryAck {
                    topic,
                    partition: Partition::new(partition),
                    offset: Offset::new(offset),
                }),
                Ok(Err((err, _))) => Err(LogError::Delivery {
                    topic,
                    message: err.to_string(),
                }),
                Err(_) => Err(LogError::Delivery {
                    topic,
                    message: "delivery report cancelled".to_string(),
                }),
            };
            let _ = reply.send(result);
            drop(guard);
        });
        handle
    }

    async fn flush(&self, timeout: Duration) -> usize {
        self.in_flight.wait_settled(timeout).await
    }
}
