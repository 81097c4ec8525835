//! Configuration from the environment.
//!
//! Every setting has a default that targets a local development stack
//! (Kafka on `localhost:9092`, order command service on `localhost:9080`).

use std::time::Duration;

use anyhow::{Context, Result};
use esv_verify::{HistoryOptions, ScenarioConfig, WaitOptions};

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Comma-separated Kafka bootstrap servers.
    pub brokers: String,

    /// Order command service, as `host:port` or a URL.
    pub order_service: String,

    pub topic: String,
    pub live_group: String,
    pub reload_group_prefix: String,
    pub poll_timeout: Duration,
    pub deadline: Duration,
    pub history_idle: Duration,
    pub flush_timeout: Duration,
    pub log_level: String,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());
        let number = |name: &str, default: u64| -> Result<u64> {
            match lookup(name) {
                Some(value) => value
                    .trim()
                    .parse()
                    .with_context(|| format!("{name} must be a non-negative integer, got {value:?}")),
                None => Ok(default),
            }
        };

        let log_json = lookup("ESV_LOG_JSON")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            brokers: var("KAFKA_BROKERS", "localhost:9092"),
            order_service: var("ORDER_CMD_MS", "localhost:9080"),
            topic: var("ESV_TOPIC", "orders"),
            live_group: var("ESV_LIVE_GROUP", "esv-orders-consumer"),
            reload_group_prefix: var("ESV_RELOAD_GROUP_PREFIX", "esv-orders-reload"),
            poll_timeout: Duration::from_millis(number("ESV_POLL_TIMEOUT_MS", 1000)?),
            deadline: Duration::from_secs(number("ESV_DEADLINE_SECS", 60)?),
            history_idle: Duration::from_secs(number("ESV_HISTORY_IDLE_SECS", 30)?),
            flush_timeout: Duration::from_secs(number("ESV_FLUSH_TIMEOUT_SECS", 10)?),
            log_level: var("ESV_LOG_LEVEL", "info"),
            log_json,
        })
    }

    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            poll_timeout: self.poll_timeout,
            deadline: self.deadline,
        }
    }

    pub fn history_options(&self) -> HistoryOptions {
        HistoryOptions {
            topic: self.topic.clone(),
            group_prefix: self.reload_group_prefix.clone(),
            idle_timeout: self.history_idle,
        }
    }

    pub fn scenario_config(&self, container_id: &str) -> ScenarioConfig {
        ScenarioConfig {
            topic: self.topic.clone(),
            live_group: self.live_group.clone(),
            wait: self.wait_options(),
            history: self.history_options(),
            flush_timeout: self.flush_timeout,
            container_id: container_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.brokers, "localhost:9092");
        assert_eq!(config.order_service, "localhost:9080");
        assert_eq!(config.topic, "orders");
        assert_eq!(config.live_group, "esv-orders-consumer");
        assert_eq!(config.wait_options(), WaitOptions::default());
        assert_eq!(config.history_options(), HistoryOptions::default());
        assert_eq!(
            config.scenario_config("c10"),
            ScenarioConfig::default()
        );
        assert!(!config.log_json);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("KAFKA_BROKERS", "kafka-1:9092,kafka-2:9092"),
            ("ESV_TOPIC", "bluewater-orders"),
            ("ESV_POLL_TIMEOUT_MS", "250"),
            ("ESV_DEADLINE_SECS", " 5 "),
            ("ESV_LOG_JSON", "true"),
        ])
        .unwrap();

        assert_eq!(config.brokers, "kafka-1:9092,kafka-2:9092");
        assert_eq!(config.history_options().topic, "bluewater-orders");
        assert_eq!(config.poll_timeout, Duration::from_millis(250));
        assert_eq!(config.deadline, Duration::from_secs(5));
        assert!(config.log_json);
    }

    #[test]
    fn test_invalid_number() {
        let err = config(&[("ESV_DEADLINE_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("ESV_DEADLINE_SECS"));
    }
}
