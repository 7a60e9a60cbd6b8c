use std::{sync::Arc, time::Duration};

use ledger_engine::{
    traits::{GatewayError, GatewayOrderInfo, GatewayOrderRequest, GatewayPlanRequest, GatewaySubscriptionInfo},
    PaymentGatewayClient,
};
use log::*;
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::GatewayConfig,
    data_objects::{
        NewRazorpayOrder,
        NewRazorpayPlan,
        NewRazorpaySubscription,
        RazorpayErrorResponse,
        RazorpayOrder,
        RazorpayPlan,
        RazorpayPlanItem,
        RazorpaySubscription,
    },
    helpers::{from_paise, from_unix_timestamp, parse_order_status, plan_period, to_paise},
    GatewayApiError,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Razorpay subscriptions need a fixed number of billing cycles.
const SUBSCRIPTION_TOTAL_COUNT: u32 = 12;

#[derive(Clone)]
pub struct RazorpayClient {
    config: GatewayConfig,
    client: Arc<Client>,
}

impl RazorpayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayApiError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/v1{path}", self.config.base_url)
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<T, GatewayApiError> {
        let url = self.url(path);
        trace!("🌐 Sending gateway request: {method} {url}");
        let mut req = self
            .client
            .request(method, url)
            .basic_auth(&self.config.key_id, Some(self.config.key_secret.reveal()));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| GatewayApiError::RestRequestError(e.to_string()))?;
        if response.status().is_success() {
            trace!("🌐 Gateway request successful. {}", response.status());
            response.json::<T>().await.map_err(|e| GatewayApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let text = response.text().await.map_err(|e| GatewayApiError::RestResponseError(e.to_string()))?;
            let error = serde_json::from_str::<RazorpayErrorResponse>(&text).unwrap_or_default().error;
            let message = error.description.unwrap_or(text);
            Err(GatewayApiError::QueryError { status, code: error.code, message })
        }
    }

    pub async fn create_razorpay_order(&self, order: NewRazorpayOrder) -> Result<RazorpayOrder, GatewayApiError> {
        debug!("🌐 Creating gateway order for receipt {}", order.receipt);
        let result = self.rest_query::<RazorpayOrder, _>(Method::POST, "/orders", Some(order)).await?;
        info!("🌐 Created gateway order {} for {} {}", result.id, result.amount, result.currency);
        Ok(result)
    }

    pub async fn get_order(&self, order_id: &str) -> Result<RazorpayOrder, GatewayApiError> {
        let path = format!("/orders/{order_id}");
        debug!("🌐 Fetching gateway order {order_id}");
        self.rest_query::<RazorpayOrder, ()>(Method::GET, &path, None).await
    }

    pub async fn create_plan(&self, plan: NewRazorpayPlan) -> Result<RazorpayPlan, GatewayApiError> {
        debug!("🌐 Creating gateway plan {} ({} x {})", plan.item.name, plan.interval, plan.period);
        let result = self.rest_query::<RazorpayPlan, _>(Method::POST, "/plans", Some(plan)).await?;
        info!("🌐 Created gateway plan {}", result.id);
        Ok(result)
    }

    pub async fn create_razorpay_subscription(
        &self,
        subscription: NewRazorpaySubscription,
    ) -> Result<RazorpaySubscription, GatewayApiError> {
        debug!("🌐 Creating gateway subscription on plan {}", subscription.plan_id);
        let result =
            self.rest_query::<RazorpaySubscription, _>(Method::POST, "/subscriptions", Some(subscription)).await?;
        info!("🌐 Created gateway subscription {} ({})", result.id, result.status);
        Ok(result)
    }
}

impl TryFrom<RazorpayOrder> for GatewayOrderInfo {
    type Error = GatewayApiError;

    fn try_from(order: RazorpayOrder) -> Result<Self, Self::Error> {
        Ok(GatewayOrderInfo {
            state: parse_order_status(&order.status)?,
            amount: from_paise(order.amount),
            created_at: order.created_at.and_then(from_unix_timestamp),
            id: order.id,
            currency: order.currency,
            receipt: order.receipt,
        })
    }
}

impl PaymentGatewayClient for RazorpayClient {
    async fn create_order(&self, request: GatewayOrderRequest) -> Result<GatewayOrderInfo, GatewayError> {
        let amount = to_paise(request.amount)?;
        let order = NewRazorpayOrder { amount, currency: request.currency, receipt: request.receipt };
        let order = self.create_razorpay_order(order).await?;
        Ok(GatewayOrderInfo::try_from(order)?)
    }

    async fn fetch_order(&self, gateway_order_id: &str) -> Result<GatewayOrderInfo, GatewayError> {
        let order = self.get_order(gateway_order_id).await?;
        Ok(GatewayOrderInfo::try_from(order)?)
    }

    async fn create_subscription_plan(&self, plan: GatewayPlanRequest) -> Result<String, GatewayError> {
        let item = RazorpayPlanItem { name: plan.name, amount: to_paise(plan.amount)?, currency: plan.currency };
        let plan = NewRazorpayPlan { period: plan_period(plan.period).to_string(), interval: plan.interval, item };
        Ok(self.create_plan(plan).await?.id)
    }

    async fn create_subscription(&self, gateway_plan_id: &str) -> Result<GatewaySubscriptionInfo, GatewayError> {
        let subscription = NewRazorpaySubscription {
            plan_id: gateway_plan_id.to_string(),
            total_count: SUBSCRIPTION_TOTAL_COUNT,
            customer_notify: true,
        };
        let sub = self.create_razorpay_subscription(subscription).await?;
        Ok(GatewaySubscriptionInfo { id: sub.id, plan_id: sub.plan_id, status: sub.status, short_url: sub.short_url })
    }
}
