//! Publish command: emit synthetic events onto the log.

use anyhow::Result;
use clap::{Args, Subcommand};
use esv_log::{DeliveryAck, LogTransport};
use esv_verify::{container_allocated, EventPublisher};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, instrument};

use crate::output::{print_json, print_success, OutputFormat};

use super::CommandContext;

/// Publish command.
#[derive(Debug, Args)]
pub struct PublishCommand {
    #[command(subcommand)]
    command: PublishSubcommand,
}

#[derive(Debug, Subcommand)]
enum PublishSubcommand {
    /// Simulate the container service allocating a container to an order.
    ContainerAllocated(ContainerAllocatedArgs),
}

#[derive(Debug, Args)]
struct ContainerAllocatedArgs {
    #[arg(long)]
    order_id: String,

    #[arg(long, default_value = "c10")]
    container_id: String,
}

#[derive(Debug, Serialize)]
struct Published {
    event_type: String,
    topic: String,
    partition: i32,
    offset: i64,
}

impl PublishCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            PublishSubcommand::ContainerAllocated(args) => {
                let transport = ctx.transport()?;
                publish_container_allocated(&ctx, &transport, args)
                    .await
                    .map(|_| ())
            }
        }
    }
}

#[instrument(skip_all, fields(order_id = %args.order_id))]
async fn publish_container_allocated<T: LogTransport>(
    ctx: &CommandContext,
    transport: &T,
    args: ContainerAllocatedArgs,
) -> Result<DeliveryAck> {
    let envelope = container_allocated(&args.order_id, &args.container_id)?;

    let publisher = EventPublisher::new(transport.producer().await?, &ctx.config.topic);
    let deadline = Instant::now() + ctx.config.flush_timeout;
    let pending = publisher.publish(&envelope)?;
    publisher.flush(ctx.config.flush_timeout).await;
    let ack = pending.wait_until(deadline).await?;
    info!(container_id = %args.container_id, "Container allocation published");

    match ctx.format {
        OutputFormat::Table => print_success(&format!(
            "Published {} for order {} to {} (partition {}, offset {})",
            envelope.event_type, args.order_id, ack.topic, ack.partition, ack.offset
        )),
        OutputFormat::Json => print_json(&Published {
            event_type: envelope.event_type,
            topic: ack.topic.clone(),
            partition: ack.partition.value(),
            offset: ack.offset.value(),
        }),
    }
    Ok(ack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use esv_events::decode;
    use esv_log::{LogReader, MemoryLog, Polled, SubscribeOptions};
    use esv_verify::DeliveryError;

    fn args() -> ContainerAllocatedArgs {
        ContainerAllocatedArgs {
            order_id: "A1".to_string(),
            container_id: "c7".to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_appends_the_allocation() {
        let log = MemoryLog::new();
        let ack = publish_container_allocated(&CommandContext::for_tests(), &log, args())
            .await
            .unwrap();
        assert_eq!(ack.topic, "orders");

        let mut reader = log
            .open(SubscribeOptions::new("orders", "check").commit(false))
            .await
            .unwrap();
        let Polled::Record(record) = reader.poll(Duration::from_secs(1)).await.unwrap() else {
            panic!("expected a record");
        };
        let envelope = decode(&record.payload).unwrap();
        assert_eq!(envelope.event_type, "OrderContainerAllocated");
        assert_eq!(envelope.payload_str("containerID"), Some("c7"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_gives_up_after_the_flush_timeout() {
        let log = MemoryLog::new();
        log.set_delivery_delay(Duration::from_secs(120));
        let mut ctx = CommandContext::for_tests();
        ctx.config.flush_timeout = Duration::from_millis(100);

        let start = Instant::now();
        let err = publish_container_allocated(&ctx, &log, args())
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DeliveryError>(),
            Some(DeliveryError::Unacknowledged { .. })
        ));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
