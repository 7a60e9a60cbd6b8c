//! Razorpay wire types. Amounts are integers in the currency's minor unit (paise for INR).
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct NewRazorpayOrder {
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub amount_due: i64,
    pub currency: String,
    pub receipt: Option<String>,
    /// One of `created`, `attempted` or `paid`.
    pub status: String,
    /// Unix timestamp, in seconds.
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RazorpayPlanItem {
    pub name: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewRazorpayPlan {
    /// `daily`, `weekly`, `monthly` or `yearly`.
    pub period: String,
    pub interval: i64,
    pub item: RazorpayPlanItem,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayPlan {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewRazorpaySubscription {
    pub plan_id: String,
    pub total_count: u32,
    pub customer_notify: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RazorpaySubscription {
    pub id: String,
    pub plan_id: String,
    pub status: String,
    pub short_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RazorpayErrorBody {
    pub code: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RazorpayErrorResponse {
    #[serde(default)]
    pub error: RazorpayErrorBody,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deserialize_order() {
        let json = r#"{
            "id": "order_IluGWxBm9U8zJ8",
            "entity": "order",
            "amount": 500000,
            "amount_paid": 0,
            "amount_due": 500000,
            "currency": "INR",
            "receipt": "sub7-plan2-1700000000000",
            "offer_id": null,
            "status": "created",
            "attempts": 0,
            "notes": [],
            "created_at": 1642662092
        }"#;
        let order: RazorpayOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.id, "order_IluGWxBm9U8zJ8");
        assert_eq!(order.amount, 500_000);
        assert_eq!(order.status, "created");
        assert_eq!(order.created_at, Some(1642662092));
    }

    #[test]
    fn deserialize_error() {
        let json = r#"{"error":{"code":"BAD_REQUEST_ERROR","description":"The id provided does not exist",
            "source":"business","step":"payment_initiation","reason":"input_validation_failed"}}"#;
        let err: RazorpayErrorResponse = serde_json::from_str(json).unwrap();
        assert_eq!(err.error.code.as_deref(), Some("BAD_REQUEST_ERROR"));
        assert_eq!(err.error.description.as_deref(), Some("The id provided does not exist"));
    }
}
