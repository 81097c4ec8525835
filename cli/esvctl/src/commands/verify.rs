//! Verify command: the full order lifecycle check.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use esv_log::LogTransport;
use esv_verify::{HttpOrderCommands, OrderLifecycleScenario, ScenarioReport};
use serde_json::Value;
use tracing::{info, instrument};

use crate::error::CliError;
use crate::output::{
    print_info, print_json, print_success, print_table, print_warning, EventRow, OutputFormat,
};

use super::CommandContext;

/// Verify command.
#[derive(Debug, Args)]
pub struct VerifyCommand {
    /// JSON file holding the order request.
    #[arg(long)]
    order_file: PathBuf,

    /// Container id for the simulated allocation.
    #[arg(long, default_value = "c10")]
    container_id: String,
}

impl VerifyCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let contents = tokio::fs::read_to_string(&self.order_file)
            .await
            .with_context(|| format!("Failed to read order from {:?}", self.order_file))?;
        let order: Value = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse order from {:?}", self.order_file))?;

        let transport = ctx.transport()?;
        self.execute(&ctx, transport, &order).await.map(|_| ())
    }

    #[instrument(skip_all, fields(container_id = %self.container_id))]
    async fn execute<T: LogTransport>(
        &self,
        ctx: &CommandContext,
        transport: T,
        order: &Value,
    ) -> Result<ScenarioReport> {
        let commands = HttpOrderCommands::new(&ctx.config.order_service)?;
        let scenario = OrderLifecycleScenario::new(
            transport,
            commands,
            ctx.config.scenario_config(&self.container_id),
        );

        let report = scenario.run(order).await?;
        info!(order_id = %report.order_id, passed = report.passed(), "Scenario finished");
        print_report(&report, ctx.format);
        verdict(&report)?;

        if ctx.format == OutputFormat::Table {
            print_success(&format!("Order {} lifecycle verified", report.order_id));
        }
        Ok(report)
    }
}

fn print_report(report: &ScenarioReport, format: OutputFormat) {
    if format == OutputFormat::Json {
        print_json(report);
        return;
    }

    print_info(&format!("Order {} created", report.order_id));
    print_table(&EventRow::from_envelopes(report.lifecycle.observed()));
    if !report.skipped.is_empty() {
        print_warning(&format!(
            "{} event(s) for this order arrived out of turn",
            report.skipped.len()
        ));
    }

    if let Some(voyage_id) = &report.voyage_id {
        print_info(&format!("Assigned to voyage {voyage_id}"));
    }
    if let Some(allocation) = &report.allocation {
        print_info(&format!(
            "Container {} allocated ({} partition {} offset {})",
            allocation.container_id, allocation.topic, allocation.partition, allocation.offset
        ));
        println!();
        print_info("Order history");
        print_table(&EventRow::from_envelopes(&report.history));
    }
}

fn verdict(report: &ScenarioReport) -> Result<()> {
    if !report.lifecycle.is_matched() {
        return Err(CliError::timeout(report.lifecycle.remaining()).into());
    }
    if report.voyage_id.is_none() {
        return Err(CliError::Failed(format!(
            "order {} was assigned without a voyageID",
            report.order_id
        ))
        .into());
    }
    if !report.passed() {
        return Err(CliError::Failed(format!(
            "container allocation for order {} was not acknowledged",
            report.order_id
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use esv_log::MemoryLog;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::commands::testing::{append, event};
    use crate::error::{exit_code, EXIT_TIMEOUT};

    async fn order_service(order_id: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "orderID": order_id,
                "status": "pending"
            })))
            .mount(&server)
            .await;
        server
    }

    fn command() -> VerifyCommand {
        VerifyCommand {
            order_file: PathBuf::from("order.json"),
            container_id: "c10".to_string(),
        }
    }

    #[tokio::test]
    async fn test_unreadable_order_file_is_reported() {
        let cmd = VerifyCommand {
            order_file: std::env::temp_dir().join("esv-no-such-order.json"),
            container_id: "c10".to_string(),
        };

        let err = cmd.run(CommandContext::for_tests()).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to read order from"));
    }

    #[tokio::test]
    async fn test_verify_passes_for_an_assigned_order() {
        let server = order_service("A1").await;
        let log = MemoryLog::new();
        append(&log, "A1", &event("OrderCreated", json!({"orderID": "A1"})));
        append(
            &log,
            "A1",
            &event("OrderAssigned", json!({"orderID": "A1", "voyageID": "V9"})),
        );

        let mut ctx = CommandContext::for_tests();
        ctx.config.order_service = server.uri();
        let report = command()
            .execute(&ctx, log.clone(), &json!({"productID": "P02"}))
            .await
            .unwrap();

        assert!(report.passed());
        assert_eq!(report.voyage_id.as_deref(), Some("V9"));
        assert_eq!(report.history.len(), 3);
        assert_eq!(log.len("orders"), 3);
    }

    #[tokio::test]
    async fn test_verify_of_an_unassigned_order_exits_with_timeout() {
        let server = order_service("A1").await;
        let log = MemoryLog::new();
        append(&log, "A1", &event("OrderCreated", json!({"orderID": "A1"})));

        let mut ctx = CommandContext::for_tests();
        ctx.config.order_service = server.uri();
        ctx.config.deadline = std::time::Duration::from_millis(300);
        let err = command()
            .execute(&ctx, log.clone(), &json!({"productID": "P02"}))
            .await
            .unwrap_err();

        assert_eq!(exit_code(&err), EXIT_TIMEOUT);
        assert_eq!(log.len("orders"), 1);
    }

    #[tokio::test]
    async fn test_verify_without_voyage_fails() {
        let server = order_service("A1").await;
        let log = MemoryLog::new();
        append(&log, "A1", &event("OrderCreated", json!({"orderID": "A1"})));
        append(&log, "A1", &event("OrderAssigned", json!({"orderID": "A1"})));

        let mut ctx = CommandContext::for_tests();
        ctx.config.order_service = server.uri();
        let err = command()
            .execute(&ctx, log, &json!({"productID": "P02"}))
            .await
            .unwrap_err();

        assert_eq!(exit_code(&err), 1);
        assert!(err.to_string().contains("without a voyageID"));
    }
}
