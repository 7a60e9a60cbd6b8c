//! Contracts for the external collaborators the engine talks to: the payment gateway and the SMS provider.
//!
//! Implementations live outside the engine (see the `gateway_tools` crate). Errors are normalised to
//! [`GatewayError`] so that provider details never leak past this boundary.
use chrono::{DateTime, Utc};
use ledger_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::DurationUnit;

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct GatewayError {
    pub message: String,
    /// The provider's error code, if it sent one.
    pub code: Option<String>,
}

impl GatewayError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self { message: message.into(), code: None }
    }

    pub fn with_code<S: Into<String>>(mut self, code: S) -> Self {
        self.code = Some(code.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayPaymentState {
    /// The order exists but no payment has been attempted.
    Created,
    /// A payment was attempted but not captured.
    Attempted,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrderRequest {
    pub amount: Money,
    pub currency: String,
    /// Our own reference for the order, echoed back by the gateway.
    pub receipt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrderInfo {
    pub id: String,
    pub amount: Money,
    pub currency: String,
    pub receipt: Option<String>,
    pub state: GatewayPaymentState,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPlanRequest {
    pub name: String,
    pub amount: Money,
    pub currency: String,
    pub interval: i64,
    pub period: DurationUnit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySubscriptionInfo {
    pub id: String,
    pub plan_id: String,
    pub status: String,
    pub short_url: Option<String>,
}

#[allow(async_fn_in_trait)]
pub trait PaymentGatewayClient: Clone {
    async fn create_order(&self, request: GatewayOrderRequest) -> Result<GatewayOrderInfo, GatewayError>;

    async fn fetch_order(&self, gateway_order_id: &str) -> Result<GatewayOrderInfo, GatewayError>;

    /// Registers a recurring plan with the gateway and returns the gateway's plan id.
    async fn create_subscription_plan(&self, plan: GatewayPlanRequest) -> Result<String, GatewayError>;

    async fn create_subscription(&self, gateway_plan_id: &str) -> Result<GatewaySubscriptionInfo, GatewayError>;
}

#[allow(async_fn_in_trait)]
pub trait SmsSender: Clone {
    async fn send_sms(&self, to: &str, message: &str) -> Result<(), GatewayError>;
}
