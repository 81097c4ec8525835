//! History command: replay every event of one order.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use esv_events::EventEnvelope;
use esv_log::LogTransport;
use esv_verify::{CorrelationKey, HistoryCollector};
use serde::Serialize;
use tracing::{info, instrument};

use crate::output::{print_info, print_json, print_table, EventRow, OutputFormat};

use super::CommandContext;

/// History command.
#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Value the correlation field must hold.
    #[arg(long)]
    order_id: String,

    /// Payload field to correlate on.
    #[arg(long, default_value = "payload.orderID")]
    field: String,

    /// Stop after this many seconds without a record (defaults to
    /// ESV_HISTORY_IDLE_SECS).
    #[arg(long)]
    idle_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
struct HistoryReport<'a> {
    key: String,
    events: &'a [EventEnvelope],
}

impl HistoryCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let transport = ctx.transport()?;
        self.execute(&ctx, &transport).await.map(|_| ())
    }

    #[instrument(skip_all, fields(order_id = %self.order_id))]
    async fn execute<T: LogTransport>(
        self,
        ctx: &CommandContext,
        transport: &T,
    ) -> Result<Vec<EventEnvelope>> {
        let key = CorrelationKey::new(&self.field, &self.order_id)?;

        let mut options = ctx.config.history_options();
        if let Some(secs) = self.idle_secs {
            options.idle_timeout = Duration::from_secs(secs);
        }

        if ctx.format == OutputFormat::Table {
            print_info(&format!(
                "Replaying {} until idle for {}s",
                options.topic,
                options.idle_timeout.as_secs()
            ));
        }

        let events = HistoryCollector::new(options)
            .collect(transport, &key)
            .await?;
        info!(events = events.len(), "History replayed");

        match ctx.format {
            OutputFormat::Table => print_table(&EventRow::from_envelopes(&events)),
            OutputFormat::Json => print_json(&HistoryReport {
                key: key.to_string(),
                events: &events,
            }),
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esv_log::MemoryLog;
    use serde_json::json;

    use crate::commands::testing::{append, event};

    #[tokio::test]
    async fn test_history_lists_only_the_order_in_log_order() {
        let log = MemoryLog::new();
        append(&log, "A1", &event("OrderCreated", json!({"orderID": "A1"})));
        append(&log, "B2", &event("OrderCreated", json!({"orderID": "B2"})));
        append(
            &log,
            "A1",
            &event("OrderAssigned", json!({"orderID": "A1", "voyageID": "V9"})),
        );

        let cmd = HistoryCommand {
            order_id: "A1".to_string(),
            field: "payload.orderID".to_string(),
            idle_secs: None,
        };
        let events = cmd
            .execute(&CommandContext::for_tests(), &log)
            .await
            .unwrap();

        let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, ["OrderCreated", "OrderAssigned"]);
    }

    #[tokio::test]
    async fn test_history_of_an_unknown_order_is_empty() {
        let log = MemoryLog::new();
        append(&log, "B2", &event("OrderCreated", json!({"orderID": "B2"})));

        let cmd = HistoryCommand {
            order_id: "A1".to_string(),
            field: "payload.orderID".to_string(),
            idle_secs: None,
        };
        let events = cmd
            .execute(&CommandContext::for_tests(), &log)
            .await
            .unwrap();
        assert!(events.is_empty());
    }
}
