use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Invoice, InvoicePayment, InvoiceStatus, ReferralCredit};

/// A payment (or reversal) has been committed to an invoice's ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecordedEvent {
    pub invoice: Invoice,
    pub payment: InvoicePayment,
    pub previous_status: InvoiceStatus,
}

impl PaymentRecordedEvent {
    pub fn new(invoice: Invoice, payment: InvoicePayment, previous_status: InvoiceStatus) -> Self {
        Self { invoice, payment, previous_status }
    }
}

/// An invoice has just been settled in full.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicePaidEvent {
    pub invoice: Invoice,
}

impl InvoicePaidEvent {
    pub fn new(invoice: Invoice) -> Self {
        Self { invoice }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionActivatedEvent {
    pub transaction_id: String,
    pub subscriber_id: i64,
    pub order_id: i64,
    pub order_number: String,
    pub subscription_id: i64,
    pub subscription_code: String,
    pub expiry_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralCreditedEvent {
    pub credit: ReferralCredit,
}

impl ReferralCreditedEvent {
    pub fn new(credit: ReferralCredit) -> Self {
        Self { credit }
    }
}

#[derive(Debug, Clone)]
pub enum EventType {
    PaymentRecorded(PaymentRecordedEvent),
    InvoicePaid(InvoicePaidEvent),
    SubscriptionActivated(SubscriptionActivatedEvent),
    ReferralCredited(ReferralCreditedEvent),
}

impl EventType {
    /// The workflow name under which downstream systems know this event.
    pub fn workflow_type(&self) -> &'static str {
        match self {
            EventType::PaymentRecorded(_) => "PaymentRecorded",
            EventType::InvoicePaid(_) => "InvoicePaid",
            EventType::SubscriptionActivated(_) => "SubscriptionActivated",
            EventType::ReferralCredited(_) => "ReferralCredited",
        }
    }
}
