use std::str::FromStr;

use cucumber::{then, when};
use ledger_common::Money;
use ledger_engine::db_types::{InvoiceStatus, NewInvoice, NewInvoicePayment, PaymentMode};

use crate::cucumber::LedgerWorld;

fn money(s: &str) -> Money {
    Money::from_str(s).unwrap_or_else(|e| panic!("Not a valid amount: {e}"))
}

#[when(expr = "I create invoice {word} for customer {word} for {word} INR")]
async fn create_invoice(world: &mut LedgerWorld, name: String, customer: String, amount: String) {
    let invoice =
        world.api().create_invoice(NewInvoice::new(customer, money(&amount))).await.expect("Error creating invoice");
    world.invoices.insert(name, invoice.id);
}

#[when(expr = "I send invoice {word}")]
async fn send_invoice(world: &mut LedgerWorld, name: String) {
    let id = world.invoice_id(&name);
    world.api().send_invoice(id).await.expect("Error sending invoice");
}

#[when(expr = "I cancel invoice {word}")]
async fn cancel_invoice(world: &mut LedgerWorld, name: String) {
    let id = world.invoice_id(&name);
    world.api().cancel_invoice(id).await.expect("Error cancelling invoice");
}

#[when(expr = "I receive a {word} payment of {word} INR with reference {word} for invoice {word}")]
async fn receive_payment(world: &mut LedgerWorld, mode: String, amount: String, reference: String, name: String) {
    let id = world.invoice_id(&name);
    let mode = PaymentMode::from_str(&mode).expect("Not a valid payment mode");
    let payment = NewInvoicePayment::new(id, money(&amount), mode, reference);
    world.last_error = world.api().record_payment(payment).await.err();
}

#[when(expr = "payment {word} is reversed with reference {word}")]
async fn reverse_payment(world: &mut LedgerWorld, original: String, reference: String) {
    let mut found = None;
    for id in world.invoices.values() {
        let payments = world.api().payments_for_invoice(*id).await.expect("Error fetching payments");
        if let Some(p) = payments.into_iter().find(|p| p.reference == original) {
            found = Some(p);
        }
    }
    let payment = found.unwrap_or_else(|| panic!("Payment {original} was not found"));
    world.last_error = world.api().reverse_payment(payment.id, &reference, None).await.err();
}

#[then(expr = "invoice {word} has status {word}")]
async fn check_status(world: &mut LedgerWorld, name: String, status: String) {
    let id = world.invoice_id(&name);
    let invoice =
        world.api().fetch_invoice(id).await.expect("Error fetching invoice").expect("Invoice is missing");
    let expected = InvoiceStatus::from_str(&status).expect("Not a valid invoice status");
    assert_eq!(invoice.status, expected, "Invoice {name} status is incorrect");
}

#[then(expr = "invoice {word} has {word} INR paid and {word} INR outstanding")]
async fn check_amounts(world: &mut LedgerWorld, name: String, paid: String, outstanding: String) {
    let id = world.invoice_id(&name);
    let invoice =
        world.api().fetch_invoice(id).await.expect("Error fetching invoice").expect("Invoice is missing");
    assert_eq!(invoice.amount_paid, money(&paid), "Amount paid is incorrect");
    assert_eq!(invoice.balance_due(), money(&outstanding), "Balance due is incorrect");
}

#[then(expr = "invoice {word} has {int} payment line(s)")]
async fn check_payment_count(world: &mut LedgerWorld, name: String, count: usize) {
    let id = world.invoice_id(&name);
    let payments = world.api().payments_for_invoice(id).await.expect("Error fetching payments");
    assert_eq!(payments.len(), count, "Number of payment lines is incorrect");
}

#[then(expr = "the last request failed with a {word} error")]
async fn check_error(world: &mut LedgerWorld, kind: String) {
    let err = world.last_error.take().expect("The last request did not fail");
    assert_eq!(err.kind().to_string(), kind, "Unexpected error: {err}");
}

#[then("the last request succeeded")]
async fn check_success(world: &mut LedgerWorld) {
    if let Some(err) = world.last_error.take() {
        panic!("The last request failed: {err}");
    }
}
