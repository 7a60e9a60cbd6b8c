use std::{sync::Arc, time::Duration};

use ledger_engine::{traits::GatewayError, SmsSender};
use log::*;
use reqwest::Client;
use serde::Serialize;

use crate::{config::SmsConfig, GatewayApiError};

const SMS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SmsRequest<'a> {
    sender: &'a str,
    to: &'a str,
    message: &'a str,
}

/// Sends text messages through a JSON-over-HTTP SMS provider, authenticated with a bearer token.
#[derive(Clone)]
pub struct HttpSmsClient {
    config: SmsConfig,
    client: Arc<Client>,
}

impl HttpSmsClient {
    pub fn new(config: SmsConfig) -> Result<Self, GatewayApiError> {
        let client = Client::builder()
            .timeout(SMS_TIMEOUT)
            .build()
            .map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }
}

impl SmsSender for HttpSmsClient {
    async fn send_sms(&self, to: &str, message: &str) -> Result<(), GatewayError> {
        let body = SmsRequest { sender: &self.config.sender, to, message };
        trace!("🌐 Sending SMS to {to}");
        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(self.config.api_key.reveal())
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayApiError::RestRequestError(e.to_string()))?;
        if response.status().is_success() {
            debug!("🌐 SMS sent to {to}");
            Ok(())
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(GatewayApiError::QueryError { status, code: None, message }.into())
        }
    }
}
