//! Wait command: block until an ordered sequence of events is seen.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use esv_log::{LogReader, LogTransport, StartPosition, SubscribeOptions};
use esv_verify::{CorrelationKey, SequenceWaiter, VerificationResult};
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::CliError;
use crate::output::{
    print_json, print_success, print_table, print_warning, EventRow, OutputFormat,
};

use super::CommandContext;

/// Wait command.
#[derive(Debug, Args)]
pub struct WaitCommand {
    /// Value the correlation field must hold.
    #[arg(long)]
    order_id: String,

    /// Expected event types, in order.
    #[arg(long, value_delimiter = ',', default_value = "OrderCreated,OrderAssigned")]
    expect: Vec<String>,

    /// Payload field to correlate on.
    #[arg(long, default_value = "payload.orderID")]
    field: String,

    /// Consumer group (defaults to ESV_LIVE_GROUP).
    #[arg(long)]
    group: Option<String>,

    /// Start new groups at the end of the topic instead of the beginning.
    #[arg(long)]
    latest: bool,

    /// Overall deadline in seconds (defaults to ESV_DEADLINE_SECS).
    #[arg(long)]
    deadline_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
struct WaitReport<'a> {
    key: String,
    expected: &'a [String],
    #[serde(flatten)]
    result: &'a VerificationResult,
}

impl WaitCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let transport = ctx.transport()?;
        self.execute(&ctx, &transport).await
    }

    #[instrument(skip_all, fields(order_id = %self.order_id))]
    async fn execute<T: LogTransport>(self, ctx: &CommandContext, transport: &T) -> Result<()> {
        let key = CorrelationKey::new(&self.field, &self.order_id)?;
        let group = self.group.unwrap_or_else(|| ctx.config.live_group.clone());
        let start = if self.latest {
            StartPosition::Latest
        } else {
            StartPosition::Earliest
        };

        let mut options = ctx.config.wait_options();
        if let Some(secs) = self.deadline_secs {
            options.deadline = Duration::from_secs(secs);
        }

        info!(group = %group, expected = ?self.expect, "Waiting for event sequence");
        let mut reader = transport
            .open(SubscribeOptions::new(&ctx.config.topic, group).start(start))
            .await?;

        let mut waiter = SequenceWaiter::new(key.clone(), self.expect.iter().cloned());
        let result = waiter.run(&mut reader, &options).await;
        reader.close();

        match ctx.format {
            OutputFormat::Json => print_json(&WaitReport {
                key: key.to_string(),
                expected: &self.expect,
                result: &result,
            }),
            OutputFormat::Table => {
                print_table(&EventRow::from_envelopes(result.observed()));
                if !waiter.skipped().is_empty() {
                    print_warning(&format!(
                        "{} correlated event(s) arrived out of turn",
                        waiter.skipped().len()
                    ));
                }
            }
        }

        match result {
            VerificationResult::Matched { .. } => {
                if ctx.format == OutputFormat::Table {
                    print_success(&format!("Observed {} for {key}", self.expect.join(" -> ")));
                }
                Ok(())
            }
            VerificationResult::TimedOut { remaining, .. } => {
                Err(CliError::timeout(&remaining).into())
            }
        }
    }
}
