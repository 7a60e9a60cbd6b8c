use std::{
    str::FromStr,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Utc;
use ledger_common::{Money, Percent};
use ledger_engine::{
    db_types::{DurationUnit, GatewayOrderStatus, NewOffer, NewSubscriber, NewSubscriptionPlan},
    test_utils::prepare_env::fresh_database,
    traits::{
        GatewayError,
        GatewayOrderInfo,
        GatewayOrderRequest,
        GatewayPaymentState,
        GatewayPlanRequest,
        GatewaySubscriptionInfo,
    },
    ErrorKind,
    LedgerDatabase,
    LedgerError,
    PaymentGatewayClient,
    SqliteDatabase,
    SubscriptionFlowApi,
    SubscriptionManagement,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::runtime::Runtime;

#[derive(Clone, Default)]
struct MockGateway {
    orders: Arc<Mutex<Vec<GatewayOrderInfo>>>,
    plans: Arc<Mutex<Vec<GatewayPlanRequest>>>,
    offline: bool,
}

impl MockGateway {
    fn offline() -> Self {
        Self { offline: true, ..Default::default() }
    }

    fn set_state(&self, id: &str, state: GatewayPaymentState) {
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.iter_mut().find(|o| o.id == id) {
            order.state = state;
        }
    }

    fn set_amount(&self, id: &str, amount: Money) {
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.iter_mut().find(|o| o.id == id) {
            order.amount = amount;
        }
    }

    fn check_online(&self) -> Result<(), GatewayError> {
        if self.offline {
            return Err(GatewayError::new("Gateway timed out").with_code("GATEWAY_ERROR"));
        }
        Ok(())
    }
}

impl PaymentGatewayClient for MockGateway {
    async fn create_order(&self, request: GatewayOrderRequest) -> Result<GatewayOrderInfo, GatewayError> {
        self.check_online()?;
        let mut orders = self.orders.lock().unwrap();
        let info = GatewayOrderInfo {
            id: format!("order_mock{}", orders.len() + 1),
            amount: request.amount,
            currency: request.currency,
            receipt: Some(request.receipt),
            state: GatewayPaymentState::Created,
            created_at: Some(Utc::now()),
        };
        orders.push(info.clone());
        Ok(info)
    }

    async fn fetch_order(&self, gateway_order_id: &str) -> Result<GatewayOrderInfo, GatewayError> {
        self.check_online()?;
        let orders = self.orders.lock().unwrap();
        orders
            .iter()
            .find(|o| o.id == gateway_order_id)
            .cloned()
            .ok_or_else(|| GatewayError::new("The id provided does not exist").with_code("BAD_REQUEST_ERROR"))
    }

    async fn create_subscription_plan(&self, plan: GatewayPlanRequest) -> Result<String, GatewayError> {
        self.check_online()?;
        let mut plans = self.plans.lock().unwrap();
        plans.push(plan);
        Ok(format!("plan_mock{}", plans.len()))
    }

    async fn create_subscription(&self, gateway_plan_id: &str) -> Result<GatewaySubscriptionInfo, GatewayError> {
        self.check_online()?;
        Ok(GatewaySubscriptionInfo {
            id: "sub_mock1".to_string(),
            plan_id: gateway_plan_id.to_string(),
            status: "created".to_string(),
            short_url: Some("https://rzp.io/i/mock".to_string()),
        })
    }
}

async fn setup() -> (SubscriptionFlowApi<SqliteDatabase>, i64, i64) {
    let db = fresh_database(2).await;
    let subscriber = db.insert_subscriber(NewSubscriber::new("+919812345678")).await.unwrap();
    let plan = db
        .insert_plan(NewSubscriptionPlan::new("Portfolio Quarterly", Money::from(3_000), 3, DurationUnit::Months))
        .await
        .unwrap();
    (SubscriptionFlowApi::new(db), subscriber.id, plan.id)
}

async fn tear_down(mut api: SubscriptionFlowApi<SqliteDatabase>) {
    if let Err(e) = api.db_mut().close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(api.db().url()).await.unwrap();
}

#[test]
fn checkout_then_capture() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let (api, subscriber_id, plan_id) = setup().await;
        let gateway = MockGateway::default();
        let order = api.create_checkout(&gateway, subscriber_id, plan_id, None).await.expect("Checkout failed");
        assert_eq!(order.status, GatewayOrderStatus::Created);
        assert_eq!(order.amount, Money::from(3_000));

        // Not paid yet
        let err = api.confirm_gateway_payment(&gateway, &order.gateway_order_id, "pay_early").await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(api.fetch_order_by_transaction_id("pay_early").await.unwrap().is_none());

        gateway.set_state(&order.gateway_order_id, GatewayPaymentState::Paid);
        let result = api.confirm_gateway_payment(&gateway, &order.gateway_order_id, "pay_123").await.unwrap();
        assert!(!result.already_processed);
        let stored = api.db().fetch_gateway_order(&order.gateway_order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, GatewayOrderStatus::Succeeded);
        assert_eq!(stored.transaction_id.as_deref(), Some("pay_123"));

        // The webhook and the client callback both confirm the same payment
        let again = api.confirm_gateway_payment(&gateway, &order.gateway_order_id, "pay_123").await.unwrap();
        assert!(again.already_processed);
        assert_eq!(again.order_id, result.order_id);

        // A different capture against a settled order is a conflict
        let err = api.confirm_gateway_payment(&gateway, &order.gateway_order_id, "pay_456").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        tear_down(api).await;
    });
}

#[test]
fn failed_checkouts_can_be_recovered() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let (api, subscriber_id, plan_id) = setup().await;
        let gateway = MockGateway::default();
        let order = api.create_checkout(&gateway, subscriber_id, plan_id, None).await.unwrap();
        let failed = api.fail_checkout(&order.gateway_order_id, "Card declined").await.unwrap();
        assert_eq!(failed.status, GatewayOrderStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("Card declined"));

        gateway.set_state(&order.gateway_order_id, GatewayPaymentState::Paid);
        api.confirm_gateway_payment(&gateway, &order.gateway_order_id, "pay_late").await.unwrap();
        let stored = api.db().fetch_gateway_order(&order.gateway_order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, GatewayOrderStatus::Succeeded);
        let err = api.fail_checkout(&order.gateway_order_id, "Too late").await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
        tear_down(api).await;
    });
}

#[test]
fn gateway_outages_are_retryable() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let (api, subscriber_id, plan_id) = setup().await;
        let err = api.create_checkout(&MockGateway::offline(), subscriber_id, plan_id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalDependency);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("Gateway timed out"));
        tear_down(api).await;
    });
}

#[test]
fn plans_are_registered_once() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let (api, _, plan_id) = setup().await;
        let gateway = MockGateway::default();
        let err = api.start_gateway_subscription(&gateway, plan_id).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let plan = api.register_plan_with_gateway(&gateway, plan_id).await.unwrap();
        assert_eq!(plan.gateway_plan_id.as_deref(), Some("plan_mock1"));
        let plan = api.register_plan_with_gateway(&gateway, plan_id).await.unwrap();
        assert_eq!(plan.gateway_plan_id.as_deref(), Some("plan_mock1"));
        assert_eq!(gateway.plans.lock().unwrap().len(), 1);
        let registered = gateway.plans.lock().unwrap()[0].clone();
        assert_eq!(registered.interval, 3);
        assert_eq!(registered.period, DurationUnit::Months);

        let sub = api.start_gateway_subscription(&gateway, plan_id).await.unwrap();
        assert_eq!(sub.plan_id, "plan_mock1");
        tear_down(api).await;
    });
}

#[test]
fn checkout_price_holds_after_the_offer_lapses() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let (api, subscriber_id, plan_id) = setup().await;
        let gateway = MockGateway::default();
        let until = Utc::now() + chrono::Duration::seconds(1);
        let offer = NewOffer::new("FLASH50", Percent::from_str("50").unwrap()).valid_until(until);
        api.db().insert_offer(offer).await.unwrap();
        let order = api.create_checkout(&gateway, subscriber_id, plan_id, Some("FLASH50")).await.unwrap();
        assert_eq!(order.gross_amount, Money::from(3_000));
        assert_eq!(order.amount, Money::from(1_500));
        assert_eq!(order.coupon_code.as_deref(), Some("FLASH50"));

        // The offer lapses and the plan is withdrawn before the capture is confirmed
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        api.db().set_plan_active(plan_id, false).await.unwrap();
        gateway.set_state(&order.gateway_order_id, GatewayPaymentState::Paid);
        let result = api.confirm_gateway_payment(&gateway, &order.gateway_order_id, "pay_flash").await.unwrap();
        assert_eq!(result.amount, Money::from(1_500));
        let stored = api.fetch_order_by_transaction_id("pay_flash").await.unwrap().unwrap();
        assert_eq!(stored.gross_amount, Money::from(3_000));
        assert_eq!(stored.discount_amount, Money::from(1_500));
        assert_eq!(stored.amount, Money::from(1_500));
        assert_eq!(stored.coupon_code.as_deref(), Some("FLASH50"));

        // Without a checkout, the lapsed offer no longer applies
        let quote = api.db().quote_price(plan_id, subscriber_id, Some("FLASH50")).await.unwrap();
        assert_eq!(quote.payable, Money::from(3_000));
        tear_down(api).await;
    });
}

#[test]
fn captures_for_the_wrong_amount_are_rejected() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let (api, subscriber_id, plan_id) = setup().await;
        let gateway = MockGateway::default();
        let order = api.create_checkout(&gateway, subscriber_id, plan_id, None).await.unwrap();
        gateway.set_state(&order.gateway_order_id, GatewayPaymentState::Paid);
        gateway.set_amount(&order.gateway_order_id, Money::from(1));

        let err = api.confirm_gateway_payment(&gateway, &order.gateway_order_id, "pay_short").await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(api.fetch_order_by_transaction_id("pay_short").await.unwrap().is_none());
        let stored = api.db().fetch_gateway_order(&order.gateway_order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, GatewayOrderStatus::Created);
        assert!(stored.transaction_id.is_none());

        // Once the gateway reports the agreed amount, the capture goes through
        gateway.set_amount(&order.gateway_order_id, Money::from(3_000));
        let result = api.confirm_gateway_payment(&gateway, &order.gateway_order_id, "pay_short").await.unwrap();
        assert_eq!(result.amount, Money::from(3_000));
        tear_down(api).await;
    });
}
