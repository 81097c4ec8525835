//! Order lifecycle check.
//!
//! Drives one order through the happy path of the shipment lifecycle:
//!
//! 1. open the live reader on the orders topic;
//! 2. submit the order to the command service;
//! 3. wait for `OrderCreated` then `OrderAssigned` for that order;
//! 4. read the voyage the order was assigned to;
//! 5. publish the `OrderContainerAllocated` event the container service
//!    would emit, and flush;
//! 6. replay the topic to reconstruct the order's full history.
//!
//! The live reader is opened before the command is sent, so events emitted
//! while the request is in flight are not missed even for a new group.

use std::time::Duration;

use esv_events::event_types::{ORDER_ASSIGNED, ORDER_CREATED};
use esv_events::{EventEnvelope, OrderEvent};
use esv_id::{Offset, Partition};
use esv_log::{LogReader, LogTransport, StartPosition, SubscribeOptions};
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::publisher::container_allocated;
use crate::{
    CorrelationKey, EventPublisher, HistoryCollector, HistoryOptions, OrderCommands,
    ScenarioError, SequenceWaiter, VerificationResult, WaitOptions, WaitStats,
};

/// Settings for one scenario run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioConfig {
    pub topic: String,

    /// Consumer group of the live reader. Its position is committed on close.
    pub live_group: String,

    pub wait: WaitOptions,
    pub history: HistoryOptions,

    /// Upper bound on waiting for the allocation event to be acknowledged.
    pub flush_timeout: Duration,

    /// Container id carried by the simulated allocation.
    pub container_id: String,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            topic: "orders".to_string(),
            live_group: "esv-orders-consumer".to_string(),
            wait: WaitOptions::default(),
            history: HistoryOptions::default(),
            flush_timeout: Duration::from_secs(10),
            container_id: "c10".to_string(),
        }
    }
}

/// Where the simulated allocation landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub container_id: String,
    pub topic: String,
    pub partition: Partition,
    pub offset: Offset,
}

/// What a scenario run observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub order_id: String,
    pub lifecycle: VerificationResult,

    /// Correlated events that arrived out of turn during the wait.
    pub skipped: Vec<EventEnvelope>,
    pub stats: WaitStats,

    pub voyage_id: Option<String>,
    pub allocation: Option<Allocation>,

    /// Every event of the order, in log order. Empty when the run stopped
    /// before the allocation step.
    pub history: Vec<EventEnvelope>,
}

impl ScenarioReport {
    /// True when the lifecycle matched, the order has a voyage and the
    /// allocation was acknowledged.
    pub fn passed(&self) -> bool {
        self.lifecycle.is_matched() && self.voyage_id.is_some() && self.allocation.is_some()
    }
}

/// The order lifecycle check against a log transport and a command service.
#[derive(Debug)]
pub struct OrderLifecycleScenario<T, C> {
    transport: T,
    commands: C,
    config: ScenarioConfig,
}

impl<T, C> OrderLifecycleScenario<T, C>
where
    T: LogTransport,
    C: OrderCommands,
{
    pub fn new(transport: T, commands: C, config: ScenarioConfig) -> Self {
        Self {
            transport,
            commands,
            config,
        }
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Runs the lifecycle for `order`.
    ///
    /// A lifecycle that times out or an assignment without a voyage ends the
    /// run early with a failing report; only infrastructure failures are
    /// errors.
    #[instrument(skip_all, fields(topic = %self.config.topic))]
    pub async fn run(&self, order: &Value) -> Result<ScenarioReport, ScenarioError> {
        let mut live = self
            .transport
            .open(
                SubscribeOptions::new(&self.config.topic, &self.config.live_group)
                    .start(StartPosition::Earliest)
                    .commit(true),
            )
            .await?;

        let order_id = self.commands.create_order(order).await?;
        let key = CorrelationKey::order_id(&order_id);

        let mut waiter = SequenceWaiter::new(key.clone(), [ORDER_CREATED, ORDER_ASSIGNED]);
        let lifecycle = waiter.run(&mut live, &self.config.wait).await;
        live.close();

        let voyage_id = lifecycle.observed().iter().find_map(voyage_of);
        let mut report = ScenarioReport {
            order_id: order_id.clone(),
            lifecycle,
            skipped: waiter.skipped().to_vec(),
            stats: waiter.stats().clone(),
            voyage_id,
            allocation: None,
            history: Vec::new(),
        };

        if !report.lifecycle.is_matched() {
            warn!(
                order_id = %order_id,
                remaining = ?report.lifecycle.remaining(),
                "Order lifecycle incomplete"
            );
            return Ok(report);
        }
        let Some(voyage_id) = report.voyage_id.as_deref() else {
            warn!(order_id = %order_id, "Order assigned without a voyageID");
            return Ok(report);
        };
        info!(order_id = %order_id, voyage_id = %voyage_id, "Order assigned to voyage");

        let publisher = EventPublisher::new(self.transport.producer().await?, &self.config.topic);
        let allocation = container_allocated(&order_id, &self.config.container_id)
            .map_err(crate::DeliveryError::from)?;
        let deadline = Instant::now() + self.config.flush_timeout;
        let pending = publisher.publish(&allocation)?;
        publisher.flush(self.config.flush_timeout).await;
        let ack = pending.wait_until(deadline).await?;
        report.allocation = Some(Allocation {
            container_id: self.config.container_id.clone(),
            topic: ack.topic,
            partition: ack.partition,
            offset: ack.offset,
        });

        report.history = HistoryCollector::new(self.config.history.clone())
            .collect(&self.transport, &key)
            .await?;

        info!(
            order_id = %order_id,
            history = report.history.len(),
            "Order lifecycle verified"
        );
        Ok(report)
    }
}

fn voyage_of(envelope: &EventEnvelope) -> Option<String> {
    match OrderEvent::from_envelope(envelope) {
        Ok(OrderEvent::Assigned(assigned)) if !assigned.voyage_id.is_empty() => {
            Some(assigned.voyage_id)
        }
        _ => None,
    }
}
