use std::{sync::Arc, time::Duration};

use chrono::Utc;
use log::*;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{config::WorkflowConfig, WorkflowError};

/// The payload posted to the workflow service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    pub workflow_type: String,
    pub id: String,
    pub product_app: String,
    /// RFC 3339
    pub timestamp: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkflowEvent {
    pub fn new<S: Into<String>, I: Into<String>>(workflow_type: S, id: I, product_app: &str) -> Self {
        Self {
            workflow_type: workflow_type.into(),
            id: id.into(),
            product_app: product_app.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            extra: Map::new(),
        }
    }

    pub fn with<V: Into<Value>>(mut self, key: &str, value: V) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

/// Exponential backoff: the wait before attempt `n + 1` is `base_delay * 2^n`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts: max_attempts.max(1), ..Default::default() }
    }

    pub fn single_attempt() -> Self {
        Self::new(1)
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Clone)]
pub struct WorkflowClient {
    config: WorkflowConfig,
    client: Arc<Client>,
}

impl WorkflowClient {
    pub fn new(config: WorkflowConfig) -> Result<Self, WorkflowError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WorkflowError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn url(&self, id: &str) -> String {
        format!("{}/{id}/{}", self.config.base_url, self.config.product_app)
    }

    pub fn event<S: Into<String>, I: Into<String>>(&self, workflow_type: S, id: I) -> WorkflowEvent {
        WorkflowEvent::new(workflow_type, id, &self.config.product_app)
    }

    pub async fn send(&self, event: &WorkflowEvent) -> Result<(), WorkflowError> {
        let url = self.url(&event.id);
        trace!("🌐 Posting {} workflow event to {url}", event.workflow_type);
        let response = self
            .client
            .post(url)
            .json(event)
            .send()
            .await
            .map_err(|e| WorkflowError::DeliveryFailed(e.to_string()))?;
        if response.status().is_success() {
            debug!("🌐 {} workflow event for {} delivered", event.workflow_type, event.id);
            Ok(())
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(WorkflowError::Rejected { status, message })
        }
    }

    /// Sends the event, retrying retryable failures according to `policy`. The last error is returned once the
    /// attempts run out.
    pub async fn send_with_retry(&self, event: &WorkflowEvent, policy: RetryPolicy) -> Result<(), WorkflowError> {
        let mut attempt = 1;
        loop {
            match self.send(event).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                    let delay = policy.delay_after(attempt);
                    warn!(
                        "🌐 Attempt {attempt}/{} to deliver {} for {} failed. {e}. Retrying in {}s",
                        policy.max_attempts,
                        event.workflow_type,
                        event.id,
                        delay.as_secs_f32()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn payload_is_flat_camel_case() {
        let event = WorkflowEvent::new("subscription_activated", "SGSER0042", "portfolio")
            .with("subscriberId", 7)
            .with("orderNumber", "SGTPL/25-26/0003");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["workflowType"], "subscription_activated");
        assert_eq!(json["id"], "SGSER0042");
        assert_eq!(json["productApp"], "portfolio");
        assert_eq!(json["subscriberId"], 7);
        assert_eq!(json["orderNumber"], "SGTPL/25-26/0003");
        assert!(json.get("extra").is_none());
        assert!(json["timestamp"].as_str().is_some());
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(RetryPolicy::new(0).max_attempts, 1);
        assert_eq!(RetryPolicy::single_attempt().max_attempts, 1);
    }

    #[test]
    fn webhook_url() {
        let config = WorkflowConfig { base_url: "https://hooks.example.com/wf".into(), ..Default::default() };
        let client = WorkflowClient::new(config).unwrap();
        assert_eq!(client.url("SGSER0042"), "https://hooks.example.com/wf/SGSER0042/portfolio");
    }

    #[test]
    fn unreachable_services_use_every_attempt() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let config = WorkflowConfig {
                base_url: "http://127.0.0.1:9/wf".into(),
                timeout: Duration::from_millis(500),
                ..Default::default()
            };
            let client = WorkflowClient::new(config).unwrap();
            let policy = RetryPolicy { max_attempts: 2, base_delay: Duration::from_millis(10) };
            let err = client.send_with_retry(&client.event("invoice_paid", "INV-0001"), policy).await.unwrap_err();
            assert!(matches!(err, WorkflowError::DeliveryFailed(_)), "{err:?}");
        });
    }
}
