use std::fmt::Debug;

use ledger_common::Money;
use log::*;

use crate::{
    db_types::{
        GatewayOrder,
        NewGatewayOrder,
        Order,
        OrderLine,
        ReferralCredit,
        Subscriber,
        Subscription,
        SubscriptionPlan,
        WalletEntry,
    },
    events::{EventProducers, ReferralCreditedEvent, SubscriptionActivatedEvent},
    helpers::PriceQuote,
    traits::{
        data_objects::{ActivationResult, PortfolioPayment},
        GatewayOrderRequest,
        GatewayPaymentState,
        GatewayPlanRequest,
        GatewaySubscriptionInfo,
        LedgerError,
        PaymentGatewayClient,
        SubscriptionManagement,
    },
};

/// `SubscriptionFlowApi` handles plan purchases: pricing, checkout with the payment gateway, and the activation of a
/// subscription once the gateway reports a captured payment.
pub struct SubscriptionFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B: Debug> Debug for SubscriptionFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SubscriptionFlowApi ({:?})", self.db)
    }
}

impl<B> SubscriptionFlowApi<B> {
    pub fn new(db: B) -> Self {
        Self { db, producers: EventProducers::default() }
    }

    pub fn with_producers(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn add_producers(&mut self, producers: EventProducers) {
        let current = std::mem::take(&mut self.producers);
        self.producers = current.merge(producers);
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

impl<B> SubscriptionFlowApi<B>
where B: SubscriptionManagement
{
    pub async fn quote_price(
        &self,
        plan_id: i64,
        subscriber_id: i64,
        coupon_code: Option<&str>,
    ) -> Result<PriceQuote, LedgerError> {
        self.db.quote_price(plan_id, subscriber_id, coupon_code).await
    }

    /// Activates the subscription paid for by `payment`.
    ///
    /// Safe to call any number of times for the same transaction id: only the first call writes anything, and only
    /// that call publishes `SubscriptionActivatedEvent` (and `ReferralCreditedEvent` if a referral was rewarded).
    /// Subsequent calls return the original result with `already_processed` set.
    pub async fn reconcile_portfolio_payment(
        &self,
        payment: PortfolioPayment,
    ) -> Result<ActivationResult, LedgerError> {
        if payment.transaction_id.trim().is_empty() {
            return Err(LedgerError::Validation("A transaction id is required".to_string()));
        }
        let transaction_id = payment.transaction_id.clone();
        let result = self.db.activate_subscription(payment).await?;
        if result.already_processed {
            info!("🎟️ Transaction {transaction_id} has already been reconciled as order {}", result.order_number);
            return Ok(result);
        }
        let event = SubscriptionActivatedEvent {
            transaction_id,
            subscriber_id: result.subscriber_id,
            order_id: result.order_id,
            order_number: result.order_number.clone(),
            subscription_id: result.subscription_id,
            subscription_code: result.subscription_code.clone(),
            expiry_date: result.expiry_date,
        };
        self.producers.publish_subscription_activated(event);
        if let Some(credit) = &result.referral_credit {
            debug!("🎟️ Referral credit of {} issued to subscriber #{}", credit.amount, credit.referrer_id);
            self.producers.publish_referral_credited(ReferralCreditedEvent::new(credit.clone()));
        }
        Ok(result)
    }

    pub async fn fetch_subscriber(&self, subscriber_id: i64) -> Result<Option<Subscriber>, LedgerError> {
        self.db.fetch_subscriber(subscriber_id).await
    }

    pub async fn fetch_plan(&self, plan_id: i64) -> Result<Option<SubscriptionPlan>, LedgerError> {
        self.db.fetch_plan(plan_id).await
    }

    pub async fn fetch_order_by_transaction_id(&self, transaction_id: &str) -> Result<Option<Order>, LedgerError> {
        self.db.fetch_order_by_transaction_id(transaction_id).await
    }

    pub async fn fetch_order_lines(&self, order_id: i64) -> Result<Vec<OrderLine>, LedgerError> {
        self.db.fetch_order_lines(order_id).await
    }

    pub async fn subscriptions_for_subscriber(&self, subscriber_id: i64) -> Result<Vec<Subscription>, LedgerError> {
        self.db.fetch_subscriptions_for_subscriber(subscriber_id).await
    }

    pub async fn referral_credits_for_referrer(&self, referrer_id: i64) -> Result<Vec<ReferralCredit>, LedgerError> {
        self.db.fetch_referral_credits_for_referrer(referrer_id).await
    }

    pub async fn wallet_entries(&self, subscriber_id: i64) -> Result<Vec<WalletEntry>, LedgerError> {
        self.db.fetch_wallet_entries(subscriber_id).await
    }

    pub async fn wallet_balance(&self, subscriber_id: i64) -> Result<Money, LedgerError> {
        self.db.wallet_balance(subscriber_id).await
    }

    /// Credits the subscriber's wallet. Repeat calls with the same reference return the original entry.
    pub async fn issue_promo_credit(
        &self,
        subscriber_id: i64,
        amount: Money,
        reference: &str,
    ) -> Result<WalletEntry, LedgerError> {
        let (entry, created) = self.db.issue_promo_credit(subscriber_id, amount, reference).await?;
        if !created {
            debug!("🎟️ Promo credit {reference} for subscriber #{subscriber_id} was already issued. Returning it.");
        }
        Ok(entry)
    }

    /// Prices the plan, opens an order with the payment gateway for the payable amount, and stores the gateway order
    /// so that the payment can be matched up when it is captured.
    pub async fn create_checkout<G: PaymentGatewayClient>(
        &self,
        gateway: &G,
        subscriber_id: i64,
        plan_id: i64,
        coupon_code: Option<&str>,
    ) -> Result<GatewayOrder, LedgerError> {
        let plan = self.db.fetch_plan(plan_id).await?.ok_or(LedgerError::PlanNotFound(plan_id))?;
        if !plan.active {
            return Err(LedgerError::Validation(format!("Plan #{plan_id} is not available for purchase")));
        }
        let price = self.db.quote_price(plan_id, subscriber_id, coupon_code).await?;
        let receipt = format!("sub{subscriber_id}-plan{plan_id}-{}", chrono::Utc::now().timestamp_millis());
        let request = GatewayOrderRequest { amount: price.payable, currency: plan.currency.clone(), receipt };
        let info = gateway.create_order(request).await.map_err(|e| {
            warn!("🌐 Could not create a gateway order for subscriber #{subscriber_id}, plan #{plan_id}. {e}");
            LedgerError::Gateway(e)
        })?;
        let order = NewGatewayOrder {
            gateway_order_id: info.id,
            subscriber_id,
            plan_id,
            gross_amount: price.gross,
            amount: price.payable,
            currency: plan.currency,
            coupon_code: price.coupon.code().map(String::from),
        };
        let order = self.db.insert_gateway_order(order).await?;
        info!("🎟️ Checkout {} opened for subscriber #{subscriber_id}: {}", order.gateway_order_id, order.amount);
        Ok(order)
    }

    /// Confirms a checkout with the gateway and, if the gateway reports the order as paid, activates the subscription
    /// with the plan, subscriber and coupon stored at checkout. The subscriber is charged the amount quoted at
    /// checkout, so a gateway order paid for any other amount is rejected.
    pub async fn confirm_gateway_payment<G: PaymentGatewayClient>(
        &self,
        gateway: &G,
        gateway_order_id: &str,
        transaction_id: &str,
    ) -> Result<ActivationResult, LedgerError> {
        let order = self
            .db
            .fetch_gateway_order(gateway_order_id)
            .await?
            .ok_or_else(|| LedgerError::GatewayOrderNotFound(gateway_order_id.to_string()))?;
        let info = gateway.fetch_order(gateway_order_id).await?;
        if info.state != GatewayPaymentState::Paid {
            warn!(
                "🌐 Gateway order {gateway_order_id} is {:?}, not paid. Transaction {transaction_id} ignored.",
                info.state
            );
            return Err(LedgerError::Validation(format!("Gateway order {gateway_order_id} has not been paid")));
        }
        if info.amount != order.amount || !info.currency.eq_ignore_ascii_case(&order.currency) {
            error!(
                "🌐 Gateway order {gateway_order_id} was paid as {} {}, but the checkout was opened for {} {}. \
                 Transaction {transaction_id} needs manual review.",
                info.amount, info.currency, order.amount, order.currency
            );
            return Err(LedgerError::Validation(format!(
                "Gateway order {gateway_order_id} was paid as {} {}, not the {} {} agreed at checkout",
                info.amount, info.currency, order.amount, order.currency
            )));
        }
        let mut payment = PortfolioPayment::new(transaction_id, order.subscriber_id, order.plan_id)
            .with_gateway_order(order.gateway_order_id);
        if let Some(code) = order.coupon_code {
            payment = payment.with_coupon(code);
        }
        self.reconcile_portfolio_payment(payment).await
    }

    pub async fn fail_checkout(&self, gateway_order_id: &str, reason: &str) -> Result<GatewayOrder, LedgerError> {
        let order = self.db.mark_gateway_order_failed(gateway_order_id, reason).await?;
        info!("🎟️ Checkout {gateway_order_id} failed: {reason}");
        Ok(order)
    }

    /// Registers the plan with the gateway as a recurring plan and stores the gateway's plan id. Plans that are
    /// already registered are returned unchanged.
    pub async fn register_plan_with_gateway<G: PaymentGatewayClient>(
        &self,
        gateway: &G,
        plan_id: i64,
    ) -> Result<SubscriptionPlan, LedgerError> {
        let plan = self.db.fetch_plan(plan_id).await?.ok_or(LedgerError::PlanNotFound(plan_id))?;
        if let Some(id) = &plan.gateway_plan_id {
            debug!("🌐 Plan #{plan_id} is already registered with the gateway as {id}");
            return Ok(plan);
        }
        let request = GatewayPlanRequest {
            name: plan.name.clone(),
            amount: plan.price,
            currency: plan.currency.clone(),
            interval: plan.duration_value,
            period: plan.duration_unit,
        };
        let gateway_plan_id = gateway.create_subscription_plan(request).await?;
        info!("🌐 Plan #{plan_id} registered with the gateway as {gateway_plan_id}");
        self.db.set_gateway_plan_id(plan_id, &gateway_plan_id).await
    }

    /// Starts a recurring gateway subscription for a plan that has been registered with the gateway.
    pub async fn start_gateway_subscription<G: PaymentGatewayClient>(
        &self,
        gateway: &G,
        plan_id: i64,
    ) -> Result<GatewaySubscriptionInfo, LedgerError> {
        let plan = self.db.fetch_plan(plan_id).await?.ok_or(LedgerError::PlanNotFound(plan_id))?;
        let gateway_plan_id = plan.gateway_plan_id.ok_or_else(|| {
            LedgerError::Validation(format!("Plan #{plan_id} has not been registered with the payment gateway"))
        })?;
        let subscription = gateway.create_subscription(&gateway_plan_id).await?;
        debug!("🌐 Gateway subscription {} started on plan {gateway_plan_id}", subscription.id);
        Ok(subscription)
    }
}
