use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use ledger_common::{Money, Percent};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {kind}: {value}")]
pub struct ConversionError {
    kind: &'static str,
    value: String,
}

/// Implements `Display` and `FromStr` for plain enums that are stored as their variant names in `TEXT` columns.
macro_rules! text_enum {
    ($name:ident { $($variant:ident),+ $(,)? }) => {
        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, stringify!($variant)),)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($variant) => Ok(Self::$variant),)+
                    s => Err(ConversionError { kind: stringify!($name), value: s.to_string() }),
                }
            }
        }
    };
}

//--------------------------------------    InvoiceStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum InvoiceStatus {
    /// Created, not yet sent to the customer.
    Draft,
    /// Sent to the customer. No money has been received (or everything received has been reversed).
    Sent,
    /// Some, but not all, of the total has been received.
    Partial,
    /// The total has been received in full.
    Paid,
    Cancelled,
    /// Read-time only. A `Sent` or `Partial` invoice whose due date has passed. Never persisted.
    Overdue,
}

text_enum!(InvoiceStatus { Draft, Sent, Partial, Paid, Cancelled, Overdue });

//--------------------------------------       Invoice       ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub invoice_number: String,
    pub customer_id: String,
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
    pub amount_paid: Money,
    pub currency: String,
    pub status: InvoiceStatus,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Invoice {
    pub fn balance_due(&self) -> Money {
        (self.total - self.amount_paid).clamp_non_negative()
    }

    /// The status as presented to readers: `Sent` and `Partial` invoices past their due date are reported as
    /// `Overdue`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> InvoiceStatus {
        match (self.status, self.due_date) {
            (InvoiceStatus::Sent | InvoiceStatus::Partial, Some(due)) if due < now.date_naive() => {
                InvoiceStatus::Overdue
            },
            (status, _) => status,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub customer_id: String,
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    /// `None` bills in the engine's default currency.
    pub currency: Option<String>,
    pub due_date: Option<NaiveDate>,
}

impl NewInvoice {
    pub fn new<S: Into<String>>(customer_id: S, subtotal: Money) -> Self {
        Self {
            customer_id: customer_id.into(),
            subtotal,
            tax: Money::zero(),
            discount: Money::zero(),
            currency: None,
            due_date: None,
        }
    }

    pub fn with_tax(mut self, tax: Money) -> Self {
        self.tax = tax;
        self
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn total(&self) -> Money {
        self.subtotal + self.tax - self.discount
    }
}

/// Changes to an unpaid invoice. Fields left as `None` are not modified.
#[derive(Debug, Clone, Default)]
pub struct ModifyInvoiceRequest {
    pub subtotal: Option<Money>,
    pub tax: Option<Money>,
    pub discount: Option<Money>,
    pub due_date: Option<NaiveDate>,
}

impl ModifyInvoiceRequest {
    pub fn is_empty(&self) -> bool {
        self.subtotal.is_none() && self.tax.is_none() && self.discount.is_none() && self.due_date.is_none()
    }

    pub fn with_subtotal(mut self, subtotal: Money) -> Self {
        self.subtotal = Some(subtotal);
        self
    }

    pub fn with_tax(mut self, tax: Money) -> Self {
        self.tax = Some(tax);
        self
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

//--------------------------------------     PaymentMode     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentMode {
    Cash,
    Card,
    BankTransfer,
    Upi,
    Cheque,
    Gateway,
    Other,
}

text_enum!(PaymentMode { Cash, Card, BankTransfer, Upi, Cheque, Gateway, Other });

//--------------------------------------   InvoicePayment    ---------------------------------------------------------
/// A single line in an invoice's payment ledger. Rows are never updated or deleted; reversals are recorded as new
/// rows with a negative amount.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InvoicePayment {
    pub id: i64,
    pub invoice_id: i64,
    pub amount: Money,
    pub mode: PaymentMode,
    /// External reference (bank reference, UTR, cheque number). Unique across all payments.
    pub reference: String,
    pub paid_on: NaiveDate,
    pub recorded_by: Option<String>,
    pub reversal_of: Option<i64>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InvoicePayment {
    pub fn is_reversal(&self) -> bool {
        self.reversal_of.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewInvoicePayment {
    pub invoice_id: i64,
    pub amount: Money,
    pub mode: PaymentMode,
    pub reference: String,
    pub paid_on: NaiveDate,
    pub recorded_by: Option<String>,
    pub note: Option<String>,
}

impl NewInvoicePayment {
    pub fn new<S: Into<String>>(invoice_id: i64, amount: Money, mode: PaymentMode, reference: S) -> Self {
        Self {
            invoice_id,
            amount,
            mode,
            reference: reference.into(),
            paid_on: Utc::now().date_naive(),
            recorded_by: None,
            note: None,
        }
    }

    pub fn paid_on(mut self, date: NaiveDate) -> Self {
        self.paid_on = date;
        self
    }

    pub fn recorded_by<S: Into<String>>(mut self, user: S) -> Self {
        self.recorded_by = Some(user.into());
        self
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = Some(note.into());
        self
    }
}

//--------------------------------------    DurationUnit     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum DurationUnit {
    Days,
    Months,
    Years,
}

text_enum!(DurationUnit { Days, Months, Years });

//--------------------------------------  SubscriptionPlan   ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: i64,
    pub name: String,
    pub price: Money,
    pub currency: String,
    pub duration_value: i64,
    pub duration_unit: DurationUnit,
    pub gateway_plan_id: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionPlan {
    /// The moment a subscription to this plan that starts at `start` expires. Returns `None` if the date would be out
    /// of range.
    pub fn expiry_from(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let value = u32::try_from(self.duration_value).ok()?;
        match self.duration_unit {
            DurationUnit::Days => start.checked_add_signed(Duration::days(i64::from(value))),
            DurationUnit::Months => start.checked_add_months(Months::new(value)),
            DurationUnit::Years => start.checked_add_months(Months::new(value.checked_mul(12)?)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewSubscriptionPlan {
    pub name: String,
    pub price: Money,
    /// `None` prices the plan in the engine's default currency.
    pub currency: Option<String>,
    pub duration_value: i64,
    pub duration_unit: DurationUnit,
}

impl NewSubscriptionPlan {
    pub fn new<S: Into<String>>(name: S, price: Money, duration_value: i64, duration_unit: DurationUnit) -> Self {
        Self {
            name: name.into(),
            price,
            currency: None,
            duration_value,
            duration_unit,
        }
    }

    pub fn with_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.currency = Some(currency.into());
        self
    }
}

//--------------------------------------     Subscriber      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: i64,
    pub subscriber_code: String,
    pub mobile: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSubscriber {
    pub mobile: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl NewSubscriber {
    pub fn new<S: Into<String>>(mobile: S) -> Self {
        Self { mobile: mobile.into(), name: None, email: None }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email<S: Into<String>>(mut self, email: S) -> Self {
        self.email = Some(email.into());
        self
    }
}

//--------------------------------------        Offer        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Offer {
    pub id: i64,
    pub code: String,
    pub discount_percent: Percent,
    pub active: bool,
    pub valid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Offer {
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.active && self.valid_until.map_or(true, |until| now <= until)
    }
}

#[derive(Debug, Clone)]
pub struct NewOffer {
    pub code: String,
    pub discount_percent: Percent,
    pub valid_until: Option<DateTime<Utc>>,
}

impl NewOffer {
    pub fn new<S: Into<String>>(code: S, discount_percent: Percent) -> Self {
        Self { code: code.into(), discount_percent, valid_until: None }
    }

    pub fn valid_until(mut self, until: DateTime<Utc>) -> Self {
        self.valid_until = Some(until);
        self
    }
}

//--------------------------------------    ReferralCode     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ReferralCode {
    pub id: i64,
    pub code: String,
    pub referrer_id: i64,
    pub reward_amount: Money,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReferralCode {
    pub code: String,
    pub referrer_id: i64,
    pub reward_amount: Money,
}

impl NewReferralCode {
    pub fn new<S: Into<String>>(code: S, referrer_id: i64, reward_amount: Money) -> Self {
        Self { code: code.into(), referrer_id, reward_amount }
    }
}

//--------------------------------------  GatewayOrderStatus ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum GatewayOrderStatus {
    Created,
    Succeeded,
    Failed,
}

text_enum!(GatewayOrderStatus { Created, Succeeded, Failed });

//--------------------------------------    GatewayOrder     ---------------------------------------------------------
/// A checkout attempt registered with the external payment gateway.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: i64,
    pub gateway_order_id: String,
    pub subscriber_id: i64,
    pub plan_id: i64,
    /// The plan price when the checkout was opened.
    pub gross_amount: Money,
    /// The amount the subscriber was asked to pay, after discounts.
    pub amount: Money,
    pub currency: String,
    pub coupon_code: Option<String>,
    pub status: GatewayOrderStatus,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewGatewayOrder {
    pub gateway_order_id: String,
    pub subscriber_id: i64,
    pub plan_id: i64,
    pub gross_amount: Money,
    pub amount: Money,
    pub currency: String,
    pub coupon_code: Option<String>,
}

//--------------------------------------     OrderStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Success,
    Failed,
}

text_enum!(OrderStatus { Pending, Success, Failed });

//--------------------------------------        Order        ---------------------------------------------------------
/// The local record of a successful plan purchase.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub subscriber_id: i64,
    pub transaction_id: String,
    pub gateway_order_id: Option<String>,
    pub gross_amount: Money,
    pub discount_amount: Money,
    pub amount: Money,
    pub coupon_code: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub plan_id: i64,
    pub quantity: i64,
    pub unit_price: Money,
    pub discount: Money,
    pub total: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    Subscription     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Active,
    Expired,
}

text_enum!(SubscriptionStatus { Active, Expired });

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub subscription_code: String,
    pub subscriber_id: i64,
    pub plan_id: i64,
    pub order_id: i64,
    pub amount: Money,
    pub start_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn status(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        if now < self.expiry_date {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Expired
        }
    }
}

//--------------------------------------   ReferralCredit    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ReferralCredit {
    pub id: i64,
    pub referrer_id: i64,
    pub referred_id: i64,
    pub code: String,
    pub order_id: i64,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     WalletSource    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum WalletSource {
    Referral,
    Promo,
    Adjustment,
}

text_enum!(WalletSource { Referral, Promo, Adjustment });

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WalletEntry {
    pub id: i64,
    pub subscriber_id: i64,
    pub amount: Money,
    pub source: WalletSource,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

//-------------------------------------- ProcessedTransaction --------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct ProcessedTransaction {
    pub transaction_id: String,
    pub order_id: Option<i64>,
    pub subscription_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

//--------------------------------------      OtpRecord      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct OtpRecord {
    pub id: i64,
    pub mobile: String,
    pub code_hash: String,
    pub created_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl OtpRecord {
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }
}
