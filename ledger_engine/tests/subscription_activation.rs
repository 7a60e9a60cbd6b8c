use std::str::FromStr;

use chrono::{TimeZone, Utc};
use futures_util::future::join_all;
use ledger_common::{Money, Percent};
use ledger_engine::{
    data_objects::PortfolioPayment,
    db_types::{
        DurationUnit,
        NewOffer,
        NewReferralCode,
        NewSubscriber,
        NewSubscriptionPlan,
        Subscriber,
        SubscriptionPlan,
        WalletSource,
    },
    helpers::Coupon,
    test_utils::prepare_env::fresh_database,
    LedgerDatabase,
    LedgerError,
    SqliteDatabase,
    SubscriptionFlowApi,
    SubscriptionManagement,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::runtime::Runtime;

struct Fixture {
    api: SubscriptionFlowApi<SqliteDatabase>,
    alice: Subscriber,
    bob: Subscriber,
    plan: SubscriptionPlan,
}

async fn setup() -> Fixture {
    let db = fresh_database(5).await;
    let alice = db.insert_subscriber(NewSubscriber::new("+919800000001").with_name("Alice")).await.unwrap();
    let bob = db.insert_subscriber(NewSubscriber::new("+919800000002").with_name("Bob")).await.unwrap();
    let plan = db
        .insert_plan(NewSubscriptionPlan::new("Portfolio Annual", Money::from(12_000), 1, DurationUnit::Years))
        .await
        .unwrap();
    Fixture { api: SubscriptionFlowApi::new(db), alice, bob, plan }
}

async fn tear_down(mut api: SubscriptionFlowApi<SqliteDatabase>) {
    if let Err(e) = api.db_mut().close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(api.db().url()).await.unwrap();
}

#[test]
fn activation_creates_order_and_subscription() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let Fixture { api, alice, plan, .. } = setup().await;
        assert_eq!(alice.subscriber_code, "SG0001");
        let paid_at = Utc.with_ymd_and_hms(2025, 5, 10, 9, 30, 0).unwrap();
        let payment = PortfolioPayment::new("pay_001", alice.id, plan.id).paid_at(paid_at);
        let result = api.reconcile_portfolio_payment(payment).await.expect("Error activating subscription");
        assert!(!result.already_processed);
        assert_eq!(result.order_number, "SGTPL/25-26/0001");
        assert_eq!(result.subscription_code, "SGSER0001");
        assert_eq!(result.amount, Money::from(12_000));
        assert_eq!(result.expiry_date, Utc.with_ymd_and_hms(2026, 5, 10, 9, 30, 0).unwrap());
        assert!(result.referral_credit.is_none());

        let order = api.fetch_order_by_transaction_id("pay_001").await.unwrap().expect("Order is missing");
        assert_eq!(order.id, result.order_id);
        let lines = api.fetch_order_lines(order.id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].plan_id, plan.id);
        assert_eq!(lines[0].total, Money::from(12_000));
        let subs = api.subscriptions_for_subscriber(alice.id).await.unwrap();
        assert_eq!(subs.len(), 1);

        // A payment in the next fiscal year starts a new tax invoice series
        let paid_at = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();
        let payment = PortfolioPayment::new("pay_002", alice.id, plan.id).paid_at(paid_at);
        let result = api.reconcile_portfolio_payment(payment).await.unwrap();
        assert_eq!(result.order_number, "SGTPL/26-27/0001");
        assert_eq!(result.subscription_code, "SGSER0002");
        tear_down(api).await;
    });
}

#[test]
fn repeated_transaction_ids_are_processed_once() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let Fixture { api, alice, plan, .. } = setup().await;
        let first = api.reconcile_portfolio_payment(PortfolioPayment::new("pay_dup", alice.id, plan.id)).await.unwrap();
        let second =
            api.reconcile_portfolio_payment(PortfolioPayment::new("pay_dup", alice.id, plan.id)).await.unwrap();
        assert!(!first.already_processed);
        assert!(second.already_processed);
        assert_eq!(first.order_id, second.order_id);
        assert_eq!(first.subscription_code, second.subscription_code);
        assert_eq!(api.subscriptions_for_subscriber(alice.id).await.unwrap().len(), 1);
        tear_down(api).await;
    });
}

#[test]
fn concurrent_duplicates_create_a_single_subscription() {
    const N: usize = 10;
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let Fixture { api, alice, plan, .. } = setup().await;
        let results = join_all((0..N).map(|_| {
            let db = api.db().clone();
            let payment = PortfolioPayment::new("pay_webhook_retry", alice.id, plan.id);
            tokio::spawn(async move { SubscriptionFlowApi::new(db).reconcile_portfolio_payment(payment).await })
        }))
        .await
        .into_iter()
        .map(|r| r.expect("Task panicked").expect("Error activating subscription"))
        .collect::<Vec<_>>();
        let fresh = results.iter().filter(|r| !r.already_processed).count();
        assert_eq!(fresh, 1, "Exactly one call should do the work");
        assert!(results.iter().all(|r| r.order_id == results[0].order_id));
        assert_eq!(api.subscriptions_for_subscriber(alice.id).await.unwrap().len(), 1);
        let order = api.fetch_order_by_transaction_id("pay_webhook_retry").await.unwrap().unwrap();
        assert_eq!(api.fetch_order_lines(order.id).await.unwrap().len(), 1);
        tear_down(api).await;
    });
}

#[test]
fn offers_discount_the_price() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let Fixture { api, alice, plan, .. } = setup().await;
        let db = api.db();
        db.insert_offer(NewOffer::new("LAUNCH20", Percent::from_str("20").unwrap())).await.unwrap();
        let expired = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        db.insert_offer(NewOffer::new("OLD50", Percent::from_str("50").unwrap()).valid_until(expired)).await.unwrap();

        let quote = api.quote_price(plan.id, alice.id, Some("LAUNCH20")).await.unwrap();
        assert_eq!(quote.discount, Money::from(2_400));
        assert_eq!(quote.payable, Money::from(9_600));
        assert!(matches!(quote.coupon, Coupon::Offer(_)));

        let quote = api.quote_price(plan.id, alice.id, Some("OLD50")).await.unwrap();
        assert_eq!(quote.payable, Money::from(12_000));
        assert_eq!(quote.coupon, Coupon::None);
        let quote = api.quote_price(plan.id, alice.id, Some("NO-SUCH-CODE")).await.unwrap();
        assert_eq!(quote.coupon, Coupon::None);

        let payment = PortfolioPayment::new("pay_offer", alice.id, plan.id).with_coupon("LAUNCH20");
        let result = api.reconcile_portfolio_payment(payment).await.unwrap();
        assert_eq!(result.amount, Money::from(9_600));
        let order = api.fetch_order_by_transaction_id("pay_offer").await.unwrap().unwrap();
        assert_eq!(order.gross_amount, Money::from(12_000));
        assert_eq!(order.discount_amount, Money::from(2_400));
        assert_eq!(order.coupon_code.as_deref(), Some("LAUNCH20"));

        db.insert_offer(NewOffer::new("FREE", Percent::from_str("100").unwrap())).await.unwrap();
        let quote = api.quote_price(plan.id, alice.id, Some("FREE")).await.unwrap();
        assert_eq!(quote.payable, Money::zero());
        tear_down(api).await;
    });
}

#[test]
fn referral_rewards_are_granted_once_per_referred_subscriber() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let Fixture { api, alice, bob, plan } = setup().await;
        let db = api.db();
        db.insert_referral_code(NewReferralCode::new("ALICE-REF", alice.id, Money::from(500))).await.unwrap();

        let payment = PortfolioPayment::new("pay_bob_1", bob.id, plan.id).with_coupon("ALICE-REF");
        let result = api.reconcile_portfolio_payment(payment).await.unwrap();
        assert_eq!(result.amount, Money::from(12_000), "Referral codes do not discount the price");
        let credit = result.referral_credit.expect("Alice should have been credited");
        assert_eq!(credit.referrer_id, alice.id);
        assert_eq!(credit.referred_id, bob.id);
        assert_eq!(credit.amount, Money::from(500));

        // Bob renews with the same code. Alice has already been rewarded for referring him.
        let payment = PortfolioPayment::new("pay_bob_2", bob.id, plan.id).with_coupon("ALICE-REF");
        let result = api.reconcile_portfolio_payment(payment).await.unwrap();
        assert!(!result.already_processed);
        assert!(result.referral_credit.is_none());

        assert_eq!(api.referral_credits_for_referrer(alice.id).await.unwrap().len(), 1);
        let entries = api.wallet_entries(alice.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, WalletSource::Referral);
        assert_eq!(entries[0].reference, format!("ALICE-REF:{}", bob.id));
        assert_eq!(api.wallet_balance(alice.id).await.unwrap(), Money::from(500));

        // Self-referral is not a coupon at all
        let payment = PortfolioPayment::new("pay_alice", alice.id, plan.id).with_coupon("ALICE-REF");
        let result = api.reconcile_portfolio_payment(payment).await.unwrap();
        assert!(result.referral_credit.is_none());
        assert_eq!(api.wallet_balance(alice.id).await.unwrap(), Money::from(500));
        tear_down(api).await;
    });
}

#[test]
fn failed_activations_leave_nothing_behind() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let Fixture { api, alice, plan, .. } = setup().await;
        let err = api.reconcile_portfolio_payment(PortfolioPayment::new("pay_x", 999, plan.id)).await.unwrap_err();
        assert!(matches!(err, LedgerError::SubscriberNotFound(999)));
        let err = api.reconcile_portfolio_payment(PortfolioPayment::new("pay_x", alice.id, 999)).await.unwrap_err();
        assert!(matches!(err, LedgerError::PlanNotFound(999)));
        let err = api.reconcile_portfolio_payment(PortfolioPayment::new("  ", alice.id, plan.id)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        api.db().set_plan_active(plan.id, false).await.unwrap();
        let err = api.reconcile_portfolio_payment(PortfolioPayment::new("pay_x", alice.id, plan.id)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(api.fetch_order_by_transaction_id("pay_x").await.unwrap().is_none());

        // The transaction id is still usable once the plan is back on sale
        api.db().set_plan_active(plan.id, true).await.unwrap();
        let result = api.reconcile_portfolio_payment(PortfolioPayment::new("pay_x", alice.id, plan.id)).await.unwrap();
        assert!(!result.already_processed);
        assert_eq!(result.order_number.len(), "SGTPL/25-26/0001".len());
        tear_down(api).await;
    });
}

#[test]
fn promo_credits_are_idempotent() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let Fixture { api, bob, .. } = setup().await;
        let first = api.issue_promo_credit(bob.id, Money::from(250), "DIWALI-2025").await.unwrap();
        let again = api.issue_promo_credit(bob.id, Money::from(250), "DIWALI-2025").await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(api.wallet_balance(bob.id).await.unwrap(), Money::from(250));
        let err = api.issue_promo_credit(bob.id, Money::zero(), "NOTHING").await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        tear_down(api).await;
    });
}
