//! CLI commands.

mod history;
mod publish;
mod verify;
mod wait;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::output::OutputFormat;

#[cfg(feature = "kafka")]
pub type Transport = esv_log::KafkaTransport;

#[cfg(not(feature = "kafka"))]
pub type Transport = esv_log::MemoryLog;

/// esv - verify event-sourced order workflows against the event log.
#[derive(Debug, Parser)]
#[command(name = "esv")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Kafka bootstrap servers.
    #[arg(long, global = true, env = "KAFKA_BROKERS")]
    brokers: Option<String>,

    /// Order command service (host:port or URL).
    #[arg(long, global = true, env = "ORDER_CMD_MS")]
    order_service: Option<String>,

    /// Topic carrying the order events.
    #[arg(long, global = true, env = "ESV_TOPIC")]
    topic: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the full order lifecycle check.
    Verify(verify::VerifyCommand),

    /// Wait for an ordered sequence of events for one order.
    Wait(wait::WaitCommand),

    /// Print every event recorded for one order.
    History(history::HistoryCommand),

    /// Publish a synthetic event.
    Publish(publish::PublishCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self, mut config: Config) -> Result<()> {
        if let Some(brokers) = self.brokers {
            config.brokers = brokers;
        }
        if let Some(order_service) = self.order_service {
            config.order_service = order_service;
        }
        if let Some(topic) = self.topic {
            config.topic = topic;
        }

        let ctx = CommandContext {
            config,
            format: OutputFormat::parse(&self.format),
        };

        match self.command {
            Commands::Verify(cmd) => cmd.run(ctx).await,
            Commands::Wait(cmd) => cmd.run(ctx).await,
            Commands::History(cmd) => cmd.run(ctx).await,
            Commands::Publish(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("esv {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
}

impl CommandContext {
    /// The event log transport for this build.
    #[cfg(feature = "kafka")]
    pub fn transport(&self) -> Result<Transport> {
        Ok(esv_log::KafkaTransport::new(&self.config.brokers))
    }

    /// The event log transport for this build.
    #[cfg(not(feature = "kafka"))]
    pub fn transport(&self) -> Result<Transport> {
        Err(crate::error::CliError::KafkaDisabled.into())
    }
}

#[cfg(test)]
impl CommandContext {
    /// Default settings with timeouts short enough for tests.
    pub(crate) fn for_tests() -> Self {
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.poll_timeout = std::time::Duration::from_millis(50);
        config.deadline = std::time::Duration::from_secs(2);
        config.history_idle = std::time::Duration::from_millis(300);
        config.flush_timeout = std::time::Duration::from_secs(2);
        Self {
            config,
            format: OutputFormat::Json,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use esv_events::{encode, EventEnvelope};
    use esv_log::MemoryLog;
    use serde_json::Value;

    pub fn event(event_type: &str, payload: Value) -> EventEnvelope {
        EventEnvelope::new(event_type, payload.as_object().cloned().unwrap())
    }

    pub fn append(log: &MemoryLog, order_id: &str, envelope: &EventEnvelope) {
        log.append("orders", Some(order_id), encode(envelope).unwrap());
    }
}
