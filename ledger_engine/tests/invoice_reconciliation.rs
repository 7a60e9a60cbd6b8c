use std::str::FromStr;

use futures_util::future::join_all;
use ledger_common::Money;
use ledger_engine::{
    db_types::{
        DurationUnit,
        InvoiceStatus,
        ModifyInvoiceRequest,
        NewInvoice,
        NewInvoicePayment,
        NewSubscriptionPlan,
        PaymentMode,
    },
    test_utils::prepare_env::fresh_database,
    InvoiceApi,
    LedgerDatabase,
    LedgerError,
    SqliteDatabase,
    SubscriptionManagement,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::runtime::Runtime;

async fn setup() -> InvoiceApi<SqliteDatabase> {
    let db = fresh_database(5).await;
    InvoiceApi::new(db)
}

async fn tear_down(mut api: InvoiceApi<SqliteDatabase>) {
    if let Err(e) = api.db_mut().close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(api.db().url()).await.unwrap();
}

fn inr(s: &str) -> Money {
    Money::from_str(s).unwrap()
}

fn payment(invoice_id: i64, amount: i64, reference: &str) -> NewInvoicePayment {
    NewInvoicePayment::new(invoice_id, Money::from(amount), PaymentMode::BankTransfer, reference)
}

#[test]
fn partial_then_full_payment() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let api = setup().await;
        let invoice = api
            .create_invoice(NewInvoice::new("ACME", Money::from(100_000)).with_tax(Money::from(26_000)))
            .await
            .expect("Error creating invoice");
        assert_eq!(invoice.invoice_number, "INV-0001");
        assert_eq!(invoice.total, Money::from(126_000));
        assert_eq!(invoice.status, InvoiceStatus::Draft);

        let invoice = api.send_invoice(invoice.id).await.expect("Error sending invoice");
        assert_eq!(invoice.status, InvoiceStatus::Sent);
        assert!(invoice.sent_at.is_some());

        let invoice = api.record_payment(payment(invoice.id, 50_000, "UTR-1")).await.expect("Error recording payment");
        assert_eq!(invoice.status, InvoiceStatus::Partial);
        assert_eq!(invoice.amount_paid, Money::from(50_000));
        assert_eq!(invoice.balance_due(), Money::from(76_000));
        assert!(invoice.paid_at.is_none());

        let invoice = api.record_payment(payment(invoice.id, 76_000, "UTR-2")).await.expect("Error recording payment");
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.amount_paid, Money::from(126_000));
        assert!(invoice.paid_at.is_some());

        let payments = api.payments_for_invoice(invoice.id).await.unwrap();
        assert_eq!(payments.len(), 2);
        tear_down(api).await;
    });
}

#[test]
fn duplicate_reference_is_rejected_without_side_effects() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let api = setup().await;
        let invoice = api.create_invoice(NewInvoice::new("ACME", Money::from(1_000))).await.unwrap();
        api.record_payment(payment(invoice.id, 400, "CHQ-881")).await.unwrap();
        let err = api.record_payment(payment(invoice.id, 400, "CHQ-881")).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicatePayment(_)), "{err:?}");
        let invoice = api.fetch_invoice(invoice.id).await.unwrap().unwrap();
        assert_eq!(invoice.amount_paid, Money::from(400));
        assert_eq!(api.payments_for_invoice(invoice.id).await.unwrap().len(), 1);
        tear_down(api).await;
    });
}

#[test]
fn validation_happens_before_any_write() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let api = setup().await;
        let invoice = api.create_invoice(NewInvoice::new("ACME", Money::from(1_000))).await.unwrap();
        let err = api.record_payment(payment(invoice.id, 0, "ZERO")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        let err = api.record_payment(payment(invoice.id, 10, "  ")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        let err = api.record_payment(payment(9999, 10, "NOPE")).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvoiceNotFound(9999)));
        assert!(api.payments_for_invoice(invoice.id).await.unwrap().is_empty());
        let err = api
            .create_invoice(NewInvoice::new("ACME", Money::from(100)).with_discount(Money::from(101)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        tear_down(api).await;
    });
}

#[test]
fn cancelled_invoices_refuse_payments() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let api = setup().await;
        let invoice = api.create_invoice(NewInvoice::new("ACME", Money::from(1_000))).await.unwrap();
        let invoice = api.cancel_invoice(invoice.id).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Cancelled);
        let err = api.record_payment(payment(invoice.id, 100, "LATE-1")).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidStatusTransition { status: InvoiceStatus::Cancelled, .. }));
        let invoice = api.fetch_invoice(invoice.id).await.unwrap().unwrap();
        assert_eq!(invoice.amount_paid, Money::zero());
        assert!(api.cancel_invoice(invoice.id).await.is_err());
        tear_down(api).await;
    });
}

#[test]
fn paid_is_terminal_for_the_lifecycle() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let api = setup().await;
        let invoice = api.create_invoice(NewInvoice::new("ACME", Money::from(500))).await.unwrap();
        api.send_invoice(invoice.id).await.unwrap();
        let err = api.send_invoice(invoice.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidStatusTransition { status: InvoiceStatus::Sent, .. }));
        // Overpayment settles the invoice and keeps the excess on record
        let invoice = api.record_payment(payment(invoice.id, 600, "UPI-1")).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.amount_paid, Money::from(600));
        assert_eq!(invoice.balance_due(), Money::zero());
        // Further payments never regress the status
        let invoice = api.record_payment(payment(invoice.id, 50, "UPI-2")).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert!(api.cancel_invoice(invoice.id).await.is_err());
        assert!(api.delete_invoice(invoice.id).await.is_err());
        let err = api.modify_invoice(invoice.id, ModifyInvoiceRequest::default().with_tax(Money::from(1))).await;
        assert!(err.is_err());
        tear_down(api).await;
    });
}

#[test]
fn modify_and_delete() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let api = setup().await;
        let invoice = api.create_invoice(NewInvoice::new("ACME", Money::from(1_000))).await.unwrap();
        let changes = ModifyInvoiceRequest::default().with_tax(Money::from(180)).with_discount(inr("30.50"));
        let invoice = api.modify_invoice(invoice.id, changes).await.unwrap();
        assert_eq!(invoice.total, inr("1149.50"));

        api.record_payment(payment(invoice.id, 800, "NEFT-1")).await.unwrap();
        let err = api
            .modify_invoice(invoice.id, ModifyInvoiceRequest::default().with_subtotal(Money::from(500)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
        // Lowering the total to exactly what was paid settles the invoice
        let changes = ModifyInvoiceRequest::default().with_subtotal(Money::from(800)).with_tax(Money::zero());
        let invoice = api.modify_invoice(invoice.id, changes.with_discount(Money::zero())).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert!(invoice.paid_at.is_some());

        let err = api.delete_invoice(invoice.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidStatusTransition { .. }));
        let draft = api.create_invoice(NewInvoice::new("ACME", Money::from(10))).await.unwrap();
        assert_eq!(draft.invoice_number, "INV-0002");
        api.delete_invoice(draft.id).await.unwrap();
        assert!(api.fetch_invoice(draft.id).await.unwrap().is_none());
        tear_down(api).await;
    });
}

#[test]
fn reversals_reopen_the_invoice() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let api = setup().await;
        let invoice = api.create_invoice(NewInvoice::new("ACME", Money::from(1_000))).await.unwrap();
        api.send_invoice(invoice.id).await.unwrap();
        api.record_payment(payment(invoice.id, 1_000, "CHQ-1")).await.unwrap();
        let original = api.payments_for_invoice(invoice.id).await.unwrap().remove(0);

        let invoice = api.reverse_payment(original.id, "CHQ-1-BOUNCED", Some("Cheque bounced".into())).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Sent);
        assert_eq!(invoice.amount_paid, Money::zero());
        assert!(invoice.paid_at.is_none());

        let lines = api.payments_for_invoice(invoice.id).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].is_reversal());
        assert_eq!(lines[1].amount, Money::from(-1_000));

        let err = api.reverse_payment(original.id, "CHQ-1-AGAIN", None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)), "{err:?}");
        let err = api.reverse_payment(lines[1].id, "UNDO-UNDO", None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)), "{err:?}");
        tear_down(api).await;
    });
}

#[test]
fn concurrent_payments_are_all_counted() {
    const N: i64 = 20;
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let api = setup().await;
        let invoice = api.create_invoice(NewInvoice::new("ACME", Money::from(100 * N))).await.unwrap();
        api.send_invoice(invoice.id).await.unwrap();
        let results = join_all((0..N).map(|i| {
            let db = api.db().clone();
            let id = invoice.id;
            tokio::spawn(async move {
                let api = InvoiceApi::new(db);
                api.record_payment(payment(id, 100, &format!("BURST-{i}"))).await
            })
        }))
        .await;
        for r in results {
            r.expect("Task panicked").expect("Error recording payment");
        }
        let invoice = api.fetch_invoice(invoice.id).await.unwrap().unwrap();
        assert_eq!(invoice.amount_paid, Money::from(100 * N));
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        let total: Money = api.payments_for_invoice(invoice.id).await.unwrap().iter().map(|p| p.amount).sum();
        assert_eq!(total, invoice.amount_paid);
        tear_down(api).await;
    });
}

#[test]
fn unspecified_currencies_use_the_engine_default() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let db = fresh_database(2).await.with_default_currency(" usd ");
        assert_eq!(db.default_currency(), "USD");
        let api = InvoiceApi::new(db);
        let invoice = api.create_invoice(NewInvoice::new("ACME", Money::from(500))).await.unwrap();
        assert_eq!(invoice.currency, "USD");
        let invoice = api.create_invoice(NewInvoice::new("ACME", Money::from(500)).with_currency("EUR")).await.unwrap();
        assert_eq!(invoice.currency, "EUR");

        let plan = NewSubscriptionPlan::new("Monthly", Money::from(999), 1, DurationUnit::Months);
        let plan = api.db().insert_plan(plan).await.unwrap();
        assert_eq!(plan.currency, "USD");
        tear_down(api).await;
    });
}
