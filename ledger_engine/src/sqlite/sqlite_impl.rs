//! `SqliteDatabase` is a concrete implementation of a ledger engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
//!
//! SQLite has no `SELECT ... FOR UPDATE`. Instead, every transaction that derives new state from existing rows starts
//! with a write against the row (or idempotency key) it is reconciling. That write takes the database's write lock
//! before anything is read, so concurrent reconcilers queue on the busy timeout rather than working from stale
//! aggregates.
use std::fmt::Debug;

use chrono::Utc;
use ledger_common::{Money, DEFAULT_CURRENCY_CODE};
use log::*;
use sqlx::{migrate, SqliteConnection, SqlitePool};

use super::db::{
    db_url,
    gateway_orders,
    idempotency,
    invoices,
    is_unique_violation,
    new_pool,
    orders,
    otp,
    payments,
    plans,
    referrals,
    sequences,
    subscribers,
    subscriptions,
    wallet,
};
use crate::{
    config::EngineConfig,
    db_types::{
        GatewayOrder,
        GatewayOrderStatus,
        Invoice,
        InvoicePayment,
        InvoiceStatus,
        ModifyInvoiceRequest,
        NewGatewayOrder,
        NewInvoice,
        NewInvoicePayment,
        NewOffer,
        NewReferralCode,
        NewSubscriber,
        NewSubscriptionPlan,
        Offer,
        Order,
        OrderLine,
        OtpRecord,
        ReferralCode,
        ReferralCredit,
        Subscriber,
        Subscription,
        SubscriptionPlan,
        WalletEntry,
        WalletSource,
    },
    helpers::{accepts_payments, derive_status, quote, resolve_coupon, Coupon, FiscalYear, PriceQuote, SequenceScope},
    traits::{
        data_objects::{ActivationResult, PaymentRecorded, PortfolioPayment},
        InvoiceManagement,
        LedgerDatabase,
        LedgerError,
        OtpApiError,
        OtpManagement,
        SequenceManagement,
        SubscriptionManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    default_currency: String,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `LEDGER_DATABASE_URL`, or the default.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool, default_currency: DEFAULT_CURRENCY_CODE.to_string() })
    }

    pub async fn from_config(config: &EngineConfig) -> Result<Self, sqlx::Error> {
        let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections).await?;
        Ok(db.with_default_currency(&config.default_currency))
    }

    /// Sets the currency for invoices and plans that do not name one.
    pub fn with_default_currency(mut self, currency: &str) -> Self {
        self.default_currency = currency.trim().to_ascii_uppercase();
        self
    }

    pub fn default_currency(&self) -> &str {
        self.default_currency.as_str()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date. Migrations are embedded in the binary.
    pub async fn run_migrations(&self) -> Result<(), LedgerError> {
        migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::DatabaseError(format!("Could not migrate {}. {e}", self.url)))?;
        info!("🗃️ Database migrations complete for {}", self.url);
        Ok(())
    }
}

fn validate_amounts(subtotal: Money, tax: Money, discount: Money) -> Result<Money, LedgerError> {
    if subtotal.is_negative() || tax.is_negative() || discount.is_negative() {
        return Err(LedgerError::Validation("Invoice amounts cannot be negative".to_string()));
    }
    let total = subtotal + tax - discount;
    if total.is_negative() {
        return Err(LedgerError::Validation(format!("The discount of {discount} exceeds the invoice value")));
    }
    Ok(total)
}

/// Re-sums the payment ledger for the invoice and checks it against the running total. A mismatch means that the
/// ledger and the invoice have diverged, and nothing further may be written.
async fn reconcile_paid_amount(
    invoice: &Invoice,
    delta: Money,
    conn: &mut SqliteConnection,
) -> Result<Money, LedgerError> {
    let total_paid = payments::total_paid_for_invoice(invoice.id, conn).await?;
    let expected = invoice.amount_paid + delta;
    if total_paid != expected {
        error!(
            "🧾 Invoice {} ledger mismatch. The payments sum to {total_paid}, but the invoice records {} and the new \
             line is {delta}. The transaction will be rolled back.",
            invoice.invoice_number, invoice.amount_paid
        );
        return Err(LedgerError::InvariantViolation(format!(
            "Payments for invoice {} sum to {total_paid}, expected {expected}",
            invoice.invoice_number
        )));
    }
    Ok(total_paid)
}

async fn resolve_coupon_code(
    code: &str,
    subscriber_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Coupon, LedgerError> {
    let offer = referrals::fetch_offer_by_code(code, conn).await?;
    let referral = referrals::fetch_referral_code(code, conn).await?;
    Ok(resolve_coupon(code, offer, referral, subscriber_id, Utc::now()))
}

async fn price_plan(
    plan: &SubscriptionPlan,
    subscriber_id: i64,
    coupon_code: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<PriceQuote, LedgerError> {
    let coupon = match coupon_code.map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => resolve_coupon_code(code, subscriber_id, conn).await?,
        None => Coupon::None,
    };
    Ok(quote(plan.price, coupon))
}

/// The quote fixed when the checkout was opened. The coupon is looked up again only so that a referrer can be
/// credited; its current validity does not change what the subscriber was charged.
async fn checkout_quote(order: &GatewayOrder, conn: &mut SqliteConnection) -> Result<PriceQuote, LedgerError> {
    let coupon = match order.coupon_code.as_deref() {
        Some(code) => {
            let offer = referrals::fetch_offer_by_code(code, conn).await?;
            let referral = referrals::fetch_referral_code(code, conn).await?;
            match (offer, referral) {
                (Some(o), _) if order.gross_amount > order.amount => Coupon::Offer(o),
                (_, Some(r)) if r.referrer_id != order.subscriber_id => Coupon::Referral(r),
                (Some(o), _) => Coupon::Offer(o),
                _ => Coupon::None,
            }
        },
        None => Coupon::None,
    };
    let discount = (order.gross_amount - order.amount).clamp_non_negative();
    Ok(PriceQuote { gross: order.gross_amount, discount, payable: order.amount, coupon })
}

/// Rebuilds the result of an activation that has already been committed.
async fn stored_activation(
    order_id: i64,
    subscription_id: i64,
    conn: &mut SqliteConnection,
) -> Result<ActivationResult, LedgerError> {
    let order = orders::fetch_order(order_id, conn)
        .await?
        .ok_or_else(|| LedgerError::DatabaseError(format!("Processed order {order_id} is missing")))?;
    let subscription = subscriptions::fetch_subscription(subscription_id, conn)
        .await?
        .ok_or_else(|| LedgerError::DatabaseError(format!("Processed subscription {subscription_id} is missing")))?;
    Ok(ActivationResult {
        order_id: order.id,
        order_number: order.order_number,
        subscription_id: subscription.id,
        subscription_code: subscription.subscription_code,
        subscriber_id: subscription.subscriber_id,
        amount: subscription.amount,
        expiry_date: subscription.expiry_date,
        referral_credit: None,
        already_processed: true,
    })
}

/// Checks that a gateway order can be settled by this payment.
fn check_gateway_order(order: &GatewayOrder, payment: &PortfolioPayment) -> Result<(), LedgerError> {
    if order.subscriber_id != payment.subscriber_id || order.plan_id != payment.plan_id {
        return Err(LedgerError::Validation(format!(
            "Gateway order {} was raised for subscriber #{} and plan #{}, not subscriber #{} and plan #{}",
            order.gateway_order_id, order.subscriber_id, order.plan_id, payment.subscriber_id, payment.plan_id
        )));
    }
    match (order.status, order.transaction_id.as_deref()) {
        (GatewayOrderStatus::Succeeded, Some(txid)) if txid != payment.transaction_id => {
            Err(LedgerError::Conflict(format!(
                "Gateway order {} has already been settled by transaction {txid}",
                order.gateway_order_id
            )))
        },
        (GatewayOrderStatus::Failed, _) => {
            warn!(
                "🎟️ Gateway order {} was marked as failed, but payment {} was captured against it. Recovering.",
                order.gateway_order_id, payment.transaction_id
            );
            Ok(())
        },
        _ => Ok(()),
    }
}

impl LedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

impl SequenceManagement for SqliteDatabase {
    async fn allocate_sequential_id(&self, scope: &SequenceScope) -> Result<String, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let id = sequences::allocate(scope, &mut tx).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn seed_sequence(&self, scope: &SequenceScope, last_issued: &str) -> Result<i64, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let value = sequences::seed(scope, last_issued, &mut tx).await?;
        tx.commit().await?;
        Ok(value)
    }

    async fn current_sequence_value(&self, scope: &SequenceScope) -> Result<Option<i64>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let value = sequences::current_value(scope, &mut conn).await?;
        Ok(value)
    }
}

impl InvoiceManagement for SqliteDatabase {
    async fn insert_invoice(&self, invoice: NewInvoice) -> Result<Invoice, LedgerError> {
        if invoice.customer_id.trim().is_empty() {
            return Err(LedgerError::Validation("An invoice needs a customer".to_string()));
        }
        validate_amounts(invoice.subtotal, invoice.tax, invoice.discount)?;
        let mut tx = self.pool.begin().await?;
        let currency = invoice.currency.clone().unwrap_or_else(|| self.default_currency.clone());
        let number = sequences::allocate(&SequenceScope::Invoice, &mut tx).await?;
        let invoice = invoices::insert_invoice(invoice, &number, &currency, &mut tx).await?;
        tx.commit().await?;
        info!("🧾 Invoice {number} created for {} with a total of {}", invoice.customer_id, invoice.total);
        Ok(invoice)
    }

    async fn fetch_invoice(&self, id: i64) -> Result<Option<Invoice>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let invoice = invoices::fetch_invoice(id, &mut conn).await?;
        Ok(invoice)
    }

    async fn fetch_invoice_by_number(&self, invoice_number: &str) -> Result<Option<Invoice>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let invoice = invoices::fetch_invoice_by_number(invoice_number, &mut conn).await?;
        Ok(invoice)
    }

    async fn fetch_payments_for_invoice(&self, invoice_id: i64) -> Result<Vec<InvoicePayment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let payments = payments::fetch_payments_for_invoice(invoice_id, &mut conn).await?;
        Ok(payments)
    }

    async fn send_invoice(&self, id: i64) -> Result<Invoice, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let invoice = invoices::lock_invoice(id, &mut tx).await?.ok_or(LedgerError::InvoiceNotFound(id))?;
        if invoice.status != InvoiceStatus::Draft {
            debug!("🧾 Refusing to send invoice {} because it is {}", invoice.invoice_number, invoice.status);
            return Err(LedgerError::InvalidStatusTransition { status: invoice.status, action: "send" });
        }
        let invoice = invoices::mark_sent(id, &mut tx).await?;
        tx.commit().await?;
        info!("🧾 Invoice {} has been sent", invoice.invoice_number);
        Ok(invoice)
    }

    async fn cancel_invoice(&self, id: i64) -> Result<Invoice, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let invoice = invoices::lock_invoice(id, &mut tx).await?.ok_or(LedgerError::InvoiceNotFound(id))?;
        if matches!(invoice.status, InvoiceStatus::Paid | InvoiceStatus::Cancelled) {
            return Err(LedgerError::InvalidStatusTransition { status: invoice.status, action: "cancel" });
        }
        let invoice = invoices::update_status(id, InvoiceStatus::Cancelled, &mut tx).await?;
        tx.commit().await?;
        info!("🧾 Invoice {} has been cancelled", invoice.invoice_number);
        Ok(invoice)
    }

    async fn modify_invoice(&self, id: i64, changes: ModifyInvoiceRequest) -> Result<Invoice, LedgerError> {
        if changes.is_empty() {
            return Err(LedgerError::Validation("No changes were requested".to_string()));
        }
        let mut tx = self.pool.begin().await?;
        let invoice = invoices::lock_invoice(id, &mut tx).await?.ok_or(LedgerError::InvoiceNotFound(id))?;
        if matches!(invoice.status, InvoiceStatus::Paid | InvoiceStatus::Cancelled) {
            return Err(LedgerError::InvalidStatusTransition { status: invoice.status, action: "modify" });
        }
        let subtotal = changes.subtotal.unwrap_or(invoice.subtotal);
        let tax = changes.tax.unwrap_or(invoice.tax);
        let discount = changes.discount.unwrap_or(invoice.discount);
        let due_date = changes.due_date.or(invoice.due_date);
        let total = validate_amounts(subtotal, tax, discount)?;
        if total < invoice.amount_paid {
            return Err(LedgerError::Conflict(format!(
                "Invoice {} has already received {}, more than the new total of {total}",
                invoice.invoice_number, invoice.amount_paid
            )));
        }
        let mut updated = invoices::update_amounts(id, subtotal, tax, discount, total, due_date, &mut tx).await?;
        let status = derive_status(invoice.status, invoice.amount_paid, total);
        if status != invoice.status {
            let paid_at = (status == InvoiceStatus::Paid).then(Utc::now);
            updated = invoices::update_reconciliation(id, invoice.amount_paid, status, paid_at, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🧾 Invoice {} modified. Total is now {total}", updated.invoice_number);
        Ok(updated)
    }

    async fn delete_invoice(&self, id: i64) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;
        let invoice = invoices::lock_invoice(id, &mut tx).await?.ok_or(LedgerError::InvoiceNotFound(id))?;
        if invoice.status == InvoiceStatus::Paid {
            return Err(LedgerError::InvalidStatusTransition { status: invoice.status, action: "delete" });
        }
        let count = payments::count_payments_for_invoice(id, &mut tx).await?;
        if count > 0 {
            return Err(LedgerError::Conflict(format!(
                "Invoice {} has {count} payment(s) recorded against it and cannot be deleted",
                invoice.invoice_number
            )));
        }
        invoices::delete_invoice(id, &mut tx).await?;
        tx.commit().await?;
        info!("🧾 Invoice {} has been deleted", invoice.invoice_number);
        Ok(())
    }

    async fn record_payment(&self, payment: NewInvoicePayment) -> Result<PaymentRecorded, LedgerError> {
        if !payment.amount.is_positive() {
            return Err(LedgerError::Validation(format!("Payment amount must be positive, not {}", payment.amount)));
        }
        if payment.reference.trim().is_empty() {
            return Err(LedgerError::Validation("A payment needs an external reference".to_string()));
        }
        let invoice_id = payment.invoice_id;
        let amount = payment.amount;
        let mut tx = self.pool.begin().await?;
        let invoice =
            invoices::lock_invoice(invoice_id, &mut tx).await?.ok_or(LedgerError::InvoiceNotFound(invoice_id))?;
        if !accepts_payments(invoice.status) {
            return Err(LedgerError::InvalidStatusTransition {
                status: invoice.status,
                action: "record a payment against",
            });
        }
        let recorded = payments::insert_payment(payment, None, &mut tx).await?;
        trace!("🧾 Payment {} of {amount} added to the ledger of {}", recorded.reference, invoice.invoice_number);
        let total_paid = reconcile_paid_amount(&invoice, amount, &mut tx).await?;
        let status = derive_status(invoice.status, total_paid, invoice.total);
        let paid_at = match status {
            InvoiceStatus::Paid => invoice.paid_at.or_else(|| Some(Utc::now())),
            _ => invoice.paid_at,
        };
        let updated = invoices::update_reconciliation(invoice_id, total_paid, status, paid_at, &mut tx).await?;
        tx.commit().await?;
        info!(
            "🧾 Payment {} of {amount} recorded against invoice {}. Paid {total_paid} of {}. Status {} -> {}",
            recorded.reference, updated.invoice_number, updated.total, invoice.status, updated.status
        );
        Ok(PaymentRecorded { invoice: updated, payment: recorded, previous_status: invoice.status })
    }

    async fn reverse_payment(
        &self,
        payment_id: i64,
        reference: &str,
        reason: Option<String>,
    ) -> Result<PaymentRecorded, LedgerError> {
        if reference.trim().is_empty() {
            return Err(LedgerError::Validation("A reversal needs an external reference".to_string()));
        }
        // Ledger lines are immutable, so the original can be read outside the transaction.
        let original = {
            let mut conn = self.pool.acquire().await?;
            payments::fetch_payment(payment_id, &mut conn).await?.ok_or(LedgerError::PaymentNotFound(payment_id))?
        };
        if original.is_reversal() {
            return Err(LedgerError::Conflict(format!("Payment {payment_id} is itself a reversal")));
        }
        let mut tx = self.pool.begin().await?;
        let invoice = invoices::lock_invoice(original.invoice_id, &mut tx)
            .await?
            .ok_or(LedgerError::InvoiceNotFound(original.invoice_id))?;
        let reversal = NewInvoicePayment {
            invoice_id: invoice.id,
            amount: -original.amount,
            mode: original.mode,
            reference: reference.to_string(),
            paid_on: Utc::now().date_naive(),
            recorded_by: None,
            note: reason,
        };
        let recorded = payments::insert_payment(reversal, Some(payment_id), &mut tx).await?;
        let total_paid = reconcile_paid_amount(&invoice, recorded.amount, &mut tx).await?;
        let status = derive_status(invoice.status, total_paid, invoice.total);
        let paid_at = if status == InvoiceStatus::Paid { invoice.paid_at } else { None };
        let updated = invoices::update_reconciliation(invoice.id, total_paid, status, paid_at, &mut tx).await?;
        tx.commit().await?;
        warn!(
            "🧾 Payment {} of {} on invoice {} reversed by {reference}. Paid {total_paid} of {}. Status {} -> {}",
            original.reference, original.amount, updated.invoice_number, updated.total, invoice.status, updated.status
        );
        Ok(PaymentRecorded { invoice: updated, payment: recorded, previous_status: invoice.status })
    }
}

impl SubscriptionManagement for SqliteDatabase {
    async fn insert_plan(&self, plan: NewSubscriptionPlan) -> Result<SubscriptionPlan, LedgerError> {
        if plan.name.trim().is_empty() {
            return Err(LedgerError::Validation("A plan needs a name".to_string()));
        }
        if plan.price.is_negative() {
            return Err(LedgerError::Validation(format!("Plan price cannot be negative: {}", plan.price)));
        }
        if plan.duration_value <= 0 {
            return Err(LedgerError::Validation(format!("Plan duration must be positive: {}", plan.duration_value)));
        }
        let currency = plan.currency.clone().unwrap_or_else(|| self.default_currency.clone());
        let mut tx = self.pool.begin().await?;
        let plan = plans::insert_plan(plan, &currency, &mut tx).await?;
        tx.commit().await?;
        debug!("🎟️ Plan #{} ({}) created at {}", plan.id, plan.name, plan.price);
        Ok(plan)
    }

    async fn fetch_plan(&self, plan_id: i64) -> Result<Option<SubscriptionPlan>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let plan = plans::fetch_plan(plan_id, &mut conn).await?;
        Ok(plan)
    }

    async fn set_plan_active(&self, plan_id: i64, active: bool) -> Result<SubscriptionPlan, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let plan = plans::set_active(plan_id, active, &mut tx).await?.ok_or(LedgerError::PlanNotFound(plan_id))?;
        tx.commit().await?;
        Ok(plan)
    }

    async fn set_gateway_plan_id(&self, plan_id: i64, gateway_plan_id: &str) -> Result<SubscriptionPlan, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let plan = match plans::set_gateway_plan_id(plan_id, gateway_plan_id, &mut tx).await {
            Ok(plan) => plan.ok_or(LedgerError::PlanNotFound(plan_id))?,
            Err(e) if is_unique_violation(&e) => {
                return Err(LedgerError::Conflict(format!(
                    "Gateway plan {gateway_plan_id} is already linked to another plan"
                )));
            },
            Err(e) => return Err(e.into()),
        };
        tx.commit().await?;
        Ok(plan)
    }

    async fn insert_offer(&self, offer: NewOffer) -> Result<Offer, LedgerError> {
        if offer.code.trim().is_empty() {
            return Err(LedgerError::Validation("An offer needs a code".to_string()));
        }
        let code = offer.code.clone();
        let mut tx = self.pool.begin().await?;
        let offer = match referrals::insert_offer(offer, &mut tx).await {
            Ok(offer) => offer,
            Err(e) if is_unique_violation(&e) => {
                return Err(LedgerError::Conflict(format!("Offer {code} already exists")));
            },
            Err(e) => return Err(e.into()),
        };
        tx.commit().await?;
        Ok(offer)
    }

    async fn insert_referral_code(&self, code: NewReferralCode) -> Result<ReferralCode, LedgerError> {
        if code.code.trim().is_empty() {
            return Err(LedgerError::Validation("A referral code cannot be blank".to_string()));
        }
        if code.reward_amount.is_negative() {
            return Err(LedgerError::Validation("Referral rewards cannot be negative".to_string()));
        }
        let mut tx = self.pool.begin().await?;
        if subscribers::fetch_subscriber(code.referrer_id, &mut tx).await?.is_none() {
            return Err(LedgerError::SubscriberNotFound(code.referrer_id));
        }
        let name = code.code.clone();
        let code = match referrals::insert_referral_code(code, &mut tx).await {
            Ok(code) => code,
            Err(e) if is_unique_violation(&e) => {
                return Err(LedgerError::Conflict(format!("Referral code {name} already exists")));
            },
            Err(e) => return Err(e.into()),
        };
        tx.commit().await?;
        Ok(code)
    }

    async fn insert_subscriber(&self, subscriber: NewSubscriber) -> Result<Subscriber, LedgerError> {
        if subscriber.mobile.trim().is_empty() {
            return Err(LedgerError::Validation("A subscriber needs a mobile number".to_string()));
        }
        let mobile = subscriber.mobile.clone();
        let mut tx = self.pool.begin().await?;
        let code = sequences::allocate(&SequenceScope::Subscriber, &mut tx).await?;
        let subscriber = match subscribers::insert_subscriber(subscriber, &code, &mut tx).await {
            Ok(s) => s,
            Err(e) if is_unique_violation(&e) => {
                return Err(LedgerError::Conflict(format!("{mobile} is already registered")));
            },
            Err(e) => return Err(e.into()),
        };
        tx.commit().await?;
        info!("🎟️ Subscriber {code} registered");
        Ok(subscriber)
    }

    async fn fetch_subscriber(&self, subscriber_id: i64) -> Result<Option<Subscriber>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let subscriber = subscribers::fetch_subscriber(subscriber_id, &mut conn).await?;
        Ok(subscriber)
    }

    async fn insert_gateway_order(&self, order: NewGatewayOrder) -> Result<GatewayOrder, LedgerError> {
        if order.gateway_order_id.trim().is_empty() {
            return Err(LedgerError::Validation("Gateway order id cannot be blank".to_string()));
        }
        if order.amount.is_negative() {
            return Err(LedgerError::Validation(format!("Order amount cannot be negative: {}", order.amount)));
        }
        let id = order.gateway_order_id.clone();
        let mut tx = self.pool.begin().await?;
        let order = match gateway_orders::insert_gateway_order(order, &mut tx).await {
            Ok(order) => order,
            Err(e) if is_unique_violation(&e) => {
                return Err(LedgerError::Conflict(format!("Gateway order {id} already exists")));
            },
            Err(e) => return Err(e.into()),
        };
        tx.commit().await?;
        debug!("🎟️ Gateway order {id} stored for {}", order.amount);
        Ok(order)
    }

    async fn fetch_gateway_order(&self, gateway_order_id: &str) -> Result<Option<GatewayOrder>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = gateway_orders::fetch_gateway_order(gateway_order_id, &mut conn).await?;
        Ok(order)
    }

    async fn mark_gateway_order_failed(
        &self,
        gateway_order_id: &str,
        reason: &str,
    ) -> Result<GatewayOrder, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let order = gateway_orders::lock_gateway_order(gateway_order_id, &mut tx)
            .await?
            .ok_or_else(|| LedgerError::GatewayOrderNotFound(gateway_order_id.to_string()))?;
        let order = match order.status {
            GatewayOrderStatus::Succeeded => {
                return Err(LedgerError::Conflict(format!(
                    "Gateway order {gateway_order_id} has already succeeded and cannot be failed"
                )));
            },
            GatewayOrderStatus::Failed => {
                debug!("🎟️ Gateway order {gateway_order_id} is already marked as failed");
                order
            },
            GatewayOrderStatus::Created => gateway_orders::mark_failed(gateway_order_id, reason, &mut tx).await?,
        };
        tx.commit().await?;
        info!("🎟️ Gateway order {gateway_order_id} failed: {reason}");
        Ok(order)
    }

    async fn quote_price(
        &self,
        plan_id: i64,
        subscriber_id: i64,
        coupon_code: Option<&str>,
    ) -> Result<PriceQuote, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let plan = plans::fetch_plan(plan_id, &mut conn).await?.ok_or(LedgerError::PlanNotFound(plan_id))?;
        if subscribers::fetch_subscriber(subscriber_id, &mut conn).await?.is_none() {
            return Err(LedgerError::SubscriberNotFound(subscriber_id));
        }
        price_plan(&plan, subscriber_id, coupon_code, &mut conn).await
    }

    async fn activate_subscription(&self, payment: PortfolioPayment) -> Result<ActivationResult, LedgerError> {
        let txid = payment.transaction_id.trim().to_string();
        if txid.is_empty() {
            return Err(LedgerError::Validation("A portfolio payment needs a transaction id".to_string()));
        }
        let mut tx = self.pool.begin().await?;
        let claim = idempotency::claim(&txid, &mut tx).await?;
        if let (Some(order_id), Some(subscription_id)) = (claim.order_id, claim.subscription_id) {
            let result = stored_activation(order_id, subscription_id, &mut tx).await?;
            tx.commit().await?;
            info!("🎟️ Transaction {txid} was already reconciled as order {}. Nothing to do.", result.order_number);
            return Ok(result);
        }
        let subscriber = subscribers::fetch_subscriber(payment.subscriber_id, &mut tx)
            .await?
            .ok_or(LedgerError::SubscriberNotFound(payment.subscriber_id))?;
        let plan =
            plans::fetch_plan(payment.plan_id, &mut tx).await?.ok_or(LedgerError::PlanNotFound(payment.plan_id))?;
        let gateway_order = match payment.gateway_order_id.as_deref() {
            Some(id) => {
                let order = gateway_orders::fetch_gateway_order(id, &mut tx)
                    .await?
                    .ok_or_else(|| LedgerError::GatewayOrderNotFound(id.to_string()))?;
                check_gateway_order(&order, &payment)?;
                Some(order)
            },
            None => None,
        };
        // A checkout opened while the plan was on sale is honoured after the plan is withdrawn.
        if !plan.active && gateway_order.is_none() {
            return Err(LedgerError::Validation(format!("Plan #{} ({}) is not available", plan.id, plan.name)));
        }
        let quote = match &gateway_order {
            Some(go) => {
                if payment.coupon_code.is_some() && payment.coupon_code != go.coupon_code {
                    warn!(
                        "🎟️ Transaction {txid} quotes coupon {:?}, but checkout {} was opened with {:?}. Using the \
                         checkout coupon.",
                        payment.coupon_code, go.gateway_order_id, go.coupon_code
                    );
                }
                checkout_quote(go, &mut tx).await?
            },
            None => price_plan(&plan, subscriber.id, payment.coupon_code.as_deref(), &mut tx).await?,
        };
        trace!(
            "🎟️ Transaction {txid}: plan #{} costs {} {} after discounts",
            plan.id,
            quote.payable,
            plan.currency
        );

        let gateway_order_id = payment.gateway_order_id.as_deref();
        let order = match orders::fetch_order_by_transaction_id(&txid, &mut tx).await? {
            Some(existing) if existing.subscriber_id != subscriber.id => {
                return Err(LedgerError::Conflict(format!(
                    "Transaction {txid} is already linked to order {} for another subscriber",
                    existing.order_number
                )));
            },
            Some(existing) => orders::update_order(existing.id, gateway_order_id, &quote, &mut tx).await?,
            None => {
                let scope = SequenceScope::TaxInvoice(FiscalYear::containing(payment.paid_at.date_naive()));
                let number = sequences::allocate(&scope, &mut tx).await?;
                orders::insert_order(&number, subscriber.id, &txid, gateway_order_id, &quote, &mut tx).await?
            },
        };
        orders::upsert_order_line(order.id, plan.id, quote.gross, quote.discount, &mut tx).await?;

        let subscription = match subscriptions::fetch_subscription_for_order(order.id, &mut tx).await? {
            Some(s) => s,
            None => {
                let expiry = plan.expiry_from(payment.paid_at).ok_or_else(|| {
                    LedgerError::Validation(format!("Plan #{} has an unrepresentable duration", plan.id))
                })?;
                let code = sequences::allocate(&SequenceScope::Subscription, &mut tx).await?;
                subscriptions::insert_subscription(&code, &order, plan.id, payment.paid_at, expiry, &mut tx).await?
            },
        };

        let referral_credit = match quote.coupon.referral() {
            Some(code) => {
                let credit = referrals::insert_referral_credit(code, subscriber.id, order.id, &mut tx).await?;
                match &credit {
                    Some(c) => {
                        let reference = format!("{}:{}", code.code, subscriber.id);
                        wallet::insert_entry(c.referrer_id, c.amount, WalletSource::Referral, &reference, &mut tx)
                            .await?;
                        debug!("🎟️ Referrer #{} credited {} for #{}", c.referrer_id, c.amount, subscriber.id);
                    },
                    None => info!(
                        "🎟️ Referrer #{} has already been credited for {} using {}",
                        code.referrer_id, subscriber.subscriber_code, code.code
                    ),
                }
                credit
            },
            None => None,
        };

        if let Some(go) = &gateway_order {
            if go.status != GatewayOrderStatus::Succeeded {
                gateway_orders::mark_succeeded(&go.gateway_order_id, &txid, payment.paid_at, &mut tx).await?;
            }
        }
        idempotency::complete(&txid, order.id, subscription.id, &mut tx).await?;
        tx.commit().await?;
        info!(
            "🎟️ Transaction {txid} reconciled. Order {} / subscription {} for {} at {}, valid until {}",
            order.order_number, subscription.subscription_code, subscriber.subscriber_code, order.amount,
            subscription.expiry_date
        );
        Ok(ActivationResult {
            order_id: order.id,
            order_number: order.order_number,
            subscription_id: subscription.id,
            subscription_code: subscription.subscription_code,
            subscriber_id: subscriber.id,
            amount: subscription.amount,
            expiry_date: subscription.expiry_date,
            referral_credit,
            already_processed: false,
        })
    }

    async fn fetch_order_by_transaction_id(&self, transaction_id: &str) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_transaction_id(transaction_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_lines(&self, order_id: i64) -> Result<Vec<OrderLine>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let lines = orders::fetch_order_lines(order_id, &mut conn).await?;
        Ok(lines)
    }

    async fn fetch_subscriptions_for_subscriber(&self, subscriber_id: i64) -> Result<Vec<Subscription>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let subscriptions = subscriptions::fetch_subscriptions_for_subscriber(subscriber_id, &mut conn).await?;
        Ok(subscriptions)
    }

    async fn fetch_referral_credits_for_referrer(&self, referrer_id: i64) -> Result<Vec<ReferralCredit>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let credits = referrals::fetch_credits_for_referrer(referrer_id, &mut conn).await?;
        Ok(credits)
    }

    async fn fetch_wallet_entries(&self, subscriber_id: i64) -> Result<Vec<WalletEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let entries = wallet::fetch_entries(subscriber_id, &mut conn).await?;
        Ok(entries)
    }

    async fn wallet_balance(&self, subscriber_id: i64) -> Result<Money, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let balance = wallet::balance(subscriber_id, &mut conn).await?;
        Ok(balance)
    }

    async fn issue_promo_credit(
        &self,
        subscriber_id: i64,
        amount: Money,
        reference: &str,
    ) -> Result<(WalletEntry, bool), LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::Validation(format!("Promo credits must be positive, not {amount}")));
        }
        if reference.trim().is_empty() {
            return Err(LedgerError::Validation("A promo credit needs a reference".to_string()));
        }
        let mut tx = self.pool.begin().await?;
        if subscribers::fetch_subscriber(subscriber_id, &mut tx).await?.is_none() {
            return Err(LedgerError::SubscriberNotFound(subscriber_id));
        }
        let result = match wallet::insert_entry(subscriber_id, amount, WalletSource::Promo, reference, &mut tx).await? {
            Some(entry) => {
                info!("🎟️ Promo credit {reference} of {amount} issued to subscriber #{subscriber_id}");
                (entry, true)
            },
            None => {
                let existing = wallet::fetch_entry(subscriber_id, WalletSource::Promo, reference, &mut tx)
                    .await?
                    .ok_or_else(|| LedgerError::DatabaseError(format!("Promo credit {reference} vanished")))?;
                debug!("🎟️ Promo credit {reference} was already issued to subscriber #{subscriber_id}");
                (existing, false)
            },
        };
        tx.commit().await?;
        Ok(result)
    }
}

impl OtpManagement for SqliteDatabase {
    async fn fetch_or_create_subscriber_for_mobile(&self, mobile: &str) -> Result<(Subscriber, bool), OtpApiError> {
        {
            let mut conn = self.pool.acquire().await?;
            if let Some(subscriber) = subscribers::fetch_subscriber_by_mobile(mobile, &mut conn).await? {
                return Ok((subscriber, false));
            }
        }
        let mut tx = self.pool.begin().await?;
        let code = sequences::allocate(&SequenceScope::Subscriber, &mut tx).await?;
        match subscribers::insert_subscriber_for_mobile(mobile, &code, &mut tx).await? {
            Some(subscriber) => {
                tx.commit().await?;
                info!("🔑 New subscriber {code} created for an OTP login");
                Ok((subscriber, true))
            },
            None => {
                // Someone registered the number in the meantime. Rolling back returns the code to the pool.
                tx.rollback().await?;
                let mut conn = self.pool.acquire().await?;
                let subscriber = subscribers::fetch_subscriber_by_mobile(mobile, &mut conn)
                    .await?
                    .ok_or_else(|| OtpApiError::DatabaseError(format!("Subscriber for {mobile} vanished")))?;
                Ok((subscriber, false))
            },
        }
    }

    async fn fetch_subscriber_by_mobile(&self, mobile: &str) -> Result<Option<Subscriber>, OtpApiError> {
        let mut conn = self.pool.acquire().await?;
        let subscriber = subscribers::fetch_subscriber_by_mobile(mobile, &mut conn).await?;
        Ok(subscriber)
    }

    async fn insert_otp(&self, mobile: &str, code_hash: &str) -> Result<OtpRecord, OtpApiError> {
        let mut tx = self.pool.begin().await?;
        let record = otp::insert_otp(mobile, code_hash, &mut tx).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn latest_otp_for_mobile(&self, mobile: &str) -> Result<Option<OtpRecord>, OtpApiError> {
        let mut conn = self.pool.acquire().await?;
        let record = otp::latest_for_mobile(mobile, &mut conn).await?;
        Ok(record)
    }

    async fn consume_otp(&self, otp_id: i64) -> Result<bool, OtpApiError> {
        let mut tx = self.pool.begin().await?;
        let consumed = otp::consume(otp_id, &mut tx).await?;
        tx.commit().await?;
        Ok(consumed)
    }
}
