//! Command side of the order service.

use async_trait::async_trait;
use esv_events::ORDER_ID_FIELD;
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info};

use crate::CommandError;

/// Submits commands whose effects are then observed on the event log.
#[async_trait]
pub trait OrderCommands: Send + Sync {
    /// Creates an order and returns its id.
    async fn create_order(&self, order: &Value) -> Result<String, CommandError>;
}

/// HTTP client for the order command service.
#[derive(Debug, Clone)]
pub struct HttpOrderCommands {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpOrderCommands {
    /// Accepts a full URL or a bare `host:port`, which is taken as `http://`.
    pub fn new(base: &str) -> Result<Self, CommandError> {
        let base = base.trim().trim_end_matches('/');
        let with_scheme = if base.contains("://") {
            base.to_string()
        } else {
            format!("http://{base}")
        };

        let base_url = Url::parse(&with_scheme)
            .ok()
            .filter(|url| url.has_host() && matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| CommandError::InvalidAddress(base.to_string()))?;

        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn orders_url(&self) -> String {
        format!("{}/orders", self.base_url.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl OrderCommands for HttpOrderCommands {
    async fn create_order(&self, order: &Value) -> Result<String, CommandError> {
        let url = self.orders_url();
        debug!(url = %url, "Submitting order");

        let response = self.client.post(&url).json(order).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CommandError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        let order_id = match body.get(ORDER_ID_FIELD) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => return Err(CommandError::MissingOrderId),
        };

        info!(order_id = %order_id, "Order created");
        Ok(order_id)
    }
}
