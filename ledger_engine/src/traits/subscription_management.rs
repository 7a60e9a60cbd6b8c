use ledger_common::Money;

use crate::{
    db_types::{
        GatewayOrder,
        NewGatewayOrder,
        NewOffer,
        NewReferralCode,
        NewSubscriber,
        NewSubscriptionPlan,
        Offer,
        Order,
        OrderLine,
        ReferralCode,
        ReferralCredit,
        Subscriber,
        Subscription,
        SubscriptionPlan,
        WalletEntry,
    },
    helpers::PriceQuote,
    traits::{
        data_objects::{ActivationResult, PortfolioPayment},
        LedgerError,
    },
};

/// Plans, subscribers, coupons and the subscription activation workflow.
#[allow(async_fn_in_trait)]
pub trait SubscriptionManagement {
    async fn insert_plan(&self, plan: NewSubscriptionPlan) -> Result<SubscriptionPlan, LedgerError>;

    async fn fetch_plan(&self, plan_id: i64) -> Result<Option<SubscriptionPlan>, LedgerError>;

    async fn set_plan_active(&self, plan_id: i64, active: bool) -> Result<SubscriptionPlan, LedgerError>;

    async fn set_gateway_plan_id(&self, plan_id: i64, gateway_plan_id: &str) -> Result<SubscriptionPlan, LedgerError>;

    async fn insert_offer(&self, offer: NewOffer) -> Result<Offer, LedgerError>;

    async fn insert_referral_code(&self, code: NewReferralCode) -> Result<ReferralCode, LedgerError>;

    /// Creates a subscriber with a freshly allocated `SG` code. The mobile number must not be registered yet.
    async fn insert_subscriber(&self, subscriber: NewSubscriber) -> Result<Subscriber, LedgerError>;

    async fn fetch_subscriber(&self, subscriber_id: i64) -> Result<Option<Subscriber>, LedgerError>;

    async fn insert_gateway_order(&self, order: NewGatewayOrder) -> Result<GatewayOrder, LedgerError>;

    async fn fetch_gateway_order(&self, gateway_order_id: &str) -> Result<Option<GatewayOrder>, LedgerError>;

    /// `Created -> Failed`. Orders that already succeeded cannot be failed.
    async fn mark_gateway_order_failed(
        &self,
        gateway_order_id: &str,
        reason: &str,
    ) -> Result<GatewayOrder, LedgerError>;

    /// Prices the plan for the subscriber, applying `coupon_code` if it resolves to a redeemable offer or referral.
    async fn quote_price(
        &self,
        plan_id: i64,
        subscriber_id: i64,
        coupon_code: Option<&str>,
    ) -> Result<PriceQuote, LedgerError>;

    /// Reconciles a captured plan payment: order, order line, subscription, referral credit and gateway order are
    /// all written in a single transaction keyed on the payment's transaction id. Repeat calls for the same
    /// transaction id return the original result with `already_processed` set and write nothing.
    async fn activate_subscription(&self, payment: PortfolioPayment) -> Result<ActivationResult, LedgerError>;

    async fn fetch_order_by_transaction_id(&self, transaction_id: &str) -> Result<Option<Order>, LedgerError>;

    async fn fetch_order_lines(&self, order_id: i64) -> Result<Vec<OrderLine>, LedgerError>;

    async fn fetch_subscriptions_for_subscriber(&self, subscriber_id: i64) -> Result<Vec<Subscription>, LedgerError>;

    async fn fetch_referral_credits_for_referrer(&self, referrer_id: i64) -> Result<Vec<ReferralCredit>, LedgerError>;

    async fn fetch_wallet_entries(&self, subscriber_id: i64) -> Result<Vec<WalletEntry>, LedgerError>;

    async fn wallet_balance(&self, subscriber_id: i64) -> Result<Money, LedgerError>;

    /// Credits the subscriber's wallet. Idempotent on `reference`: the second element of the result is `false` if a
    /// promo credit with this reference already existed, in which case the existing entry is returned.
    async fn issue_promo_credit(
        &self,
        subscriber_id: i64,
        amount: Money,
        reference: &str,
    ) -> Result<(WalletEntry, bool), LedgerError>;
}
