use std::{fmt::Display, str::FromStr, time::Duration};

use ledger_common::{helpers::parse_env_var, Secret};
use log::*;

pub const DEFAULT_RAZORPAY_BASE_URL: &str = "https://api.razorpay.com";
pub const DEFAULT_WORKFLOW_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_WORKFLOW_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: Secret<String>,
}

impl GatewayConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("LEDGER_RAZORPAY_BASE_URL").unwrap_or_else(|_| {
            info!("🪛️ LEDGER_RAZORPAY_BASE_URL not set, using {DEFAULT_RAZORPAY_BASE_URL}");
            DEFAULT_RAZORPAY_BASE_URL.to_string()
        });
        let key_id = std::env::var("LEDGER_RAZORPAY_KEY_ID").unwrap_or_else(|_| {
            warn!("🪛️ LEDGER_RAZORPAY_KEY_ID not set, using (probably useless) default");
            "rzp_test_00000000000000".to_string()
        });
        let key_secret = Secret::new(std::env::var("LEDGER_RAZORPAY_KEY_SECRET").unwrap_or_else(|_| {
            warn!("🪛️ LEDGER_RAZORPAY_KEY_SECRET not set, using (probably useless) default");
            "00000000000000".to_string()
        }));
        Self { base_url: trim_url(base_url), key_id, key_secret }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub base_url: String,
    /// Identifies the product app that raised the event. Sent both in the path and in the payload.
    pub product_app: String,
    pub timeout: Duration,
    /// Upper bound on delivery attempts for events that are retried.
    pub max_attempts: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000/workflows".to_string(),
            product_app: "portfolio".to_string(),
            timeout: DEFAULT_WORKFLOW_TIMEOUT,
            max_attempts: DEFAULT_WORKFLOW_MAX_ATTEMPTS,
        }
    }
}

impl WorkflowConfig {
    pub fn new_from_env_or_default() -> Self {
        let defaults = Self::default();
        let base_url = std::env::var("LEDGER_WORKFLOW_BASE_URL").unwrap_or_else(|_| {
            warn!("🪛️ LEDGER_WORKFLOW_BASE_URL not set, using {}", defaults.base_url);
            defaults.base_url.clone()
        });
        let product_app = std::env::var("LEDGER_WORKFLOW_PRODUCT_APP").unwrap_or_else(|_| {
            info!("🪛️ LEDGER_WORKFLOW_PRODUCT_APP not set, using {}", defaults.product_app);
            defaults.product_app.clone()
        });
        let timeout = env_or_default("LEDGER_WORKFLOW_TIMEOUT_SECS", defaults.timeout.as_secs());
        let max_attempts = env_or_default("LEDGER_WORKFLOW_MAX_ATTEMPTS", defaults.max_attempts).max(1);
        Self { base_url: trim_url(base_url), product_app, timeout: Duration::from_secs(timeout), max_attempts }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SmsConfig {
    pub url: String,
    pub api_key: Secret<String>,
    /// The sender id that recipients see.
    pub sender: String,
}

impl SmsConfig {
    pub fn new_from_env_or_default() -> Self {
        let url = std::env::var("LEDGER_SMS_URL").unwrap_or_else(|_| {
            warn!("🪛️ LEDGER_SMS_URL not set, using (probably useless) default");
            "http://localhost:4001/sms".to_string()
        });
        let api_key = Secret::new(std::env::var("LEDGER_SMS_API_KEY").unwrap_or_else(|_| {
            warn!("🪛️ LEDGER_SMS_API_KEY not set, using (probably useless) default");
            "00000000000000".to_string()
        }));
        let sender = std::env::var("LEDGER_SMS_SENDER").unwrap_or_else(|_| {
            info!("🪛️ LEDGER_SMS_SENDER not set, using LEDGER");
            "LEDGER".to_string()
        });
        Self { url, api_key, sender }
    }
}

fn env_or_default<T>(var: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match parse_env_var::<T>(var) {
        Ok(Some(v)) => v,
        Ok(None) => default,
        Err(e) => {
            error!("🪛️ {e}. Using the default value of {default} instead.");
            default
        },
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
