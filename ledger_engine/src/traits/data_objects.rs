use chrono::{DateTime, Utc};
use ledger_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{Invoice, InvoicePayment, InvoiceStatus, ReferralCredit};

/// A captured payment for a plan purchase, as reported by the checkout flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioPayment {
    /// The gateway's payment (transaction) id. This is the idempotency key for the whole activation.
    pub transaction_id: String,
    pub plan_id: i64,
    pub subscriber_id: i64,
    pub coupon_code: Option<String>,
    pub gateway_order_id: Option<String>,
    pub paid_at: DateTime<Utc>,
}

impl PortfolioPayment {
    pub fn new<S: Into<String>>(transaction_id: S, subscriber_id: i64, plan_id: i64) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            plan_id,
            subscriber_id,
            coupon_code: None,
            gateway_order_id: None,
            paid_at: Utc::now(),
        }
    }

    pub fn with_coupon<S: Into<String>>(mut self, code: S) -> Self {
        self.coupon_code = Some(code.into());
        self
    }

    pub fn with_gateway_order<S: Into<String>>(mut self, gateway_order_id: S) -> Self {
        self.gateway_order_id = Some(gateway_order_id.into());
        self
    }

    pub fn paid_at(mut self, paid_at: DateTime<Utc>) -> Self {
        self.paid_at = paid_at;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationResult {
    pub order_id: i64,
    pub order_number: String,
    pub subscription_id: i64,
    pub subscription_code: String,
    pub subscriber_id: i64,
    pub amount: Money,
    pub expiry_date: DateTime<Utc>,
    /// The referral credit granted by this activation, if any. Always `None` when `already_processed` is set.
    pub referral_credit: Option<ReferralCredit>,
    /// True if the transaction had already been reconciled and nothing new was written.
    pub already_processed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub invoice: Invoice,
    pub payment: InvoicePayment,
    pub previous_status: InvoiceStatus,
}

impl PaymentRecorded {
    /// True if this payment moved the invoice into `Paid`.
    pub fn settled_invoice(&self) -> bool {
        self.previous_status != InvoiceStatus::Paid && self.invoice.status == InvoiceStatus::Paid
    }
}
