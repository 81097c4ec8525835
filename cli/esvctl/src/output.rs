//! Output formatting for CLI commands.

use chrono::DateTime;
use colored::Colorize;
use esv_events::{EventEnvelope, ORDER_ID_FIELD};
use serde::Serialize;
use tabled::{Table, Tabled};

const CLI_SCHEMA_VERSION: &str = "esv.cli.v1";

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Self {
        match value {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Table,
        }
    }
}

/// One event as a table row.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct EventRow {
    #[tabled(rename = "#")]
    pub index: usize,

    #[tabled(rename = "Time")]
    pub time: String,

    #[tabled(rename = "Type")]
    pub event_type: String,

    #[tabled(rename = "Version")]
    pub version: String,

    #[tabled(rename = "Order")]
    pub order_id: String,

    #[tabled(rename = "Payload")]
    pub payload: String,
}

impl EventRow {
    pub fn from_envelopes(events: &[EventEnvelope]) -> Vec<Self> {
        events
            .iter()
            .enumerate()
            .map(|(i, event)| Self {
                index: i + 1,
                time: format_timestamp(event.timestamp),
                event_type: event.event_type.clone(),
                version: event.version.clone(),
                order_id: event.payload_str(ORDER_ID_FIELD).unwrap_or("-").to_string(),
                payload: serde_json::to_string(&event.payload).unwrap_or_default(),
            })
            .collect()
    }
}

/// Event timestamps are unix seconds; zero means the producer sent none.
fn format_timestamp(timestamp: i64) -> String {
    if timestamp == 0 {
        return "-".to_string();
    }
    DateTime::from_timestamp(timestamp, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Print rows as a table.
pub fn print_table<T: Tabled>(rows: &[T]) {
    if rows.is_empty() {
        println!("{}", "No events found.".dimmed());
    } else {
        println!("{}", Table::new(rows));
    }
}

/// Print a single item as JSON.
pub fn print_json<T: Serialize>(data: &T) {
    println!("{}", format_json(data));
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", "Warning:".yellow().bold(), message);
}

fn format_json<T: Serialize + ?Sized>(data: &T) -> String {
    let value = serde_json::to_value(data).unwrap_or_else(|_| serde_json::json!({}));
    let wrapped = serde_json::json!({
        "schemaVersion": CLI_SCHEMA_VERSION,
        "data": value
    });
    serde_json::to_string_pretty(&wrapped).unwrap_or_else(|_| "{}".to_string())
}
