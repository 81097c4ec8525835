//! Error handling and display for the CLI.

use colored::Colorize;
use esv_log::LogError;
use esv_verify::{CommandError, DeliveryError, ScenarioError};
use thiserror::Error;

/// Exit code when an expected event sequence did not complete in time.
pub const EXIT_TIMEOUT: i32 = 2;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Timed out waiting for {remaining}")]
    Timeout { remaining: String },

    #[error("Verification failed: {0}")]
    Failed(String),

    #[cfg(not(feature = "kafka"))]
    #[error("This build of esv has no Kafka support")]
    KafkaDisabled,
}

impl CliError {
    pub fn timeout(remaining: &[String]) -> Self {
        Self::Timeout {
            remaining: remaining.join(", "),
        }
    }
}

/// Maps an error to the process exit code.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<CliError>() {
        Some(CliError::Timeout { .. }) => EXIT_TIMEOUT,
        _ => 1,
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(hint) = hint(err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

fn hint(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Timeout { .. } => Some(
                "Check that the services emitting these events are running, or raise ESV_DEADLINE_SECS.",
            ),
            #[cfg(not(feature = "kafka"))]
            CliError::KafkaDisabled => {
                Some("Rebuild with `cargo install esvctl --features kafka`.")
            }
            CliError::Failed(_) => None,
        };
    }

    let log_err = err
        .downcast_ref::<LogError>()
        .or_else(|| match err.downcast_ref::<ScenarioError>() {
            Some(ScenarioError::Log(e)) => Some(e),
            _ => None,
        });
    if let Some(LogError::Connection { .. }) = log_err {
        return Some("Check that Kafka is reachable at KAFKA_BROKERS.");
    }

    let delivery_err = err
        .downcast_ref::<DeliveryError>()
        .or_else(|| match err.downcast_ref::<ScenarioError>() {
            Some(ScenarioError::Delivery(e)) => Some(e),
            _ => None,
        });
    if let Some(DeliveryError::Unacknowledged { .. }) = delivery_err {
        return Some("The broker did not confirm the write in time; raise ESV_FLUSH_TIMEOUT_SECS.");
    }

    let command_err = err
        .downcast_ref::<CommandError>()
        .or_else(|| match err.downcast_ref::<ScenarioError>() {
            Some(ScenarioError::Command(e)) => Some(e),
            _ => None,
        });
    match command_err {
        Some(CommandError::Http(_)) | Some(CommandError::InvalidAddress(_)) => {
            Some("Check that the order command service is reachable at ORDER_CMD_MS.")
        }
        Some(CommandError::MissingOrderId) => {
            Some("The order service answered without an orderID; is ORDER_CMD_MS the command service?")
        }
        _ => None,
    }
}
