use chrono::{DateTime, Utc};
use ledger_common::Money;
use ledger_engine::{db_types::DurationUnit, traits::GatewayPaymentState};

use crate::GatewayApiError;

/// Razorpay expects amounts in paise.
pub fn to_paise(amount: Money) -> Result<i64, GatewayApiError> {
    amount.to_minor_units().map_err(|e| GatewayApiError::InvalidCurrencyAmount(e.to_string()))
}

pub fn from_paise(paise: i64) -> Money {
    Money::from_minor_units(paise)
}

pub fn parse_order_status(status: &str) -> Result<GatewayPaymentState, GatewayApiError> {
    match status {
        "created" => Ok(GatewayPaymentState::Created),
        "attempted" => Ok(GatewayPaymentState::Attempted),
        "paid" => Ok(GatewayPaymentState::Paid),
        s => Err(GatewayApiError::UnsupportedValue(format!("order status '{s}'"))),
    }
}

pub fn plan_period(unit: DurationUnit) -> &'static str {
    match unit {
        DurationUnit::Days => "daily",
        DurationUnit::Months => "monthly",
        DurationUnit::Years => "yearly",
    }
}

pub fn from_unix_timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}
