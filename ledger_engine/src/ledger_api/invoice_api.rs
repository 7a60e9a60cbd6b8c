use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Invoice, InvoicePayment, ModifyInvoiceRequest, NewInvoice, NewInvoicePayment},
    events::{EventProducers, InvoicePaidEvent, PaymentRecordedEvent},
    traits::{data_objects::PaymentRecorded, InvoiceManagement, LedgerError},
};

/// `InvoiceApi` manages the invoice lifecycle and applies payments to invoices.
///
/// All reconciliation happens in the backend, inside a single transaction. This layer publishes the resulting events
/// once that transaction has committed.
pub struct InvoiceApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B: Debug> Debug for InvoiceApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InvoiceApi ({:?})", self.db)
    }
}

impl<B> InvoiceApi<B> {
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

impl<B> InvoiceApi<B>
where B: InvoiceManagement
{
    pub async fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice, LedgerError> {
        self.db.insert_invoice(invoice).await
    }

    pub async fn fetch_invoice(&self, id: i64) -> Result<Option<Invoice>, LedgerError> {
        self.db.fetch_invoice(id).await
    }

    pub async fn fetch_invoice_by_number(&self, invoice_number: &str) -> Result<Option<Invoice>, LedgerError> {
        self.db.fetch_invoice_by_number(invoice_number).await
    }

    pub async fn payments_for_invoice(&self, invoice_id: i64) -> Result<Vec<InvoicePayment>, LedgerError> {
        self.db.fetch_payments_for_invoice(invoice_id).await
    }

    pub async fn send_invoice(&self, id: i64) -> Result<Invoice, LedgerError> {
        self.db.send_invoice(id).await
    }

    pub async fn cancel_invoice(&self, id: i64) -> Result<Invoice, LedgerError> {
        self.db.cancel_invoice(id).await
    }

    pub async fn modify_invoice(&self, id: i64, changes: ModifyInvoiceRequest) -> Result<Invoice, LedgerError> {
        if changes.is_empty() {
            return self.db.fetch_invoice(id).await?.ok_or(LedgerError::InvoiceNotFound(id));
        }
        self.db.modify_invoice(id, changes).await
    }

    pub async fn delete_invoice(&self, id: i64) -> Result<(), LedgerError> {
        self.db.delete_invoice(id).await
    }

    /// Records a payment against an invoice and returns the reconciled invoice.
    ///
    /// A `PaymentRecordedEvent` is published for every successful call, followed by an `InvoicePaidEvent` if this
    /// payment settled the invoice. A payment whose reference has been seen before is rejected and nothing is written.
    pub async fn record_payment(&self, payment: NewInvoicePayment) -> Result<Invoice, LedgerError> {
        let recorded = self.db.record_payment(payment).await?;
        self.publish(&recorded);
        Ok(recorded.invoice)
    }

    /// Appends a reversal for the given payment and returns the reconciled invoice.
    pub async fn reverse_payment(
        &self,
        payment_id: i64,
        reference: &str,
        reason: Option<String>,
    ) -> Result<Invoice, LedgerError> {
        let recorded = self.db.reverse_payment(payment_id, reference, reason).await?;
        self.publish(&recorded);
        Ok(recorded.invoice)
    }

    fn publish(&self, recorded: &PaymentRecorded) {
        trace!("🧾 Publishing payment recorded event for invoice {}", recorded.invoice.invoice_number);
        let event =
            PaymentRecordedEvent::new(recorded.invoice.clone(), recorded.payment.clone(), recorded.previous_status);
        self.producers.publish_payment_recorded(event);
        if recorded.settled_invoice() {
            debug!("🧾 Invoice {} is paid in full. Publishing invoice paid event", recorded.invoice.invoice_number);
            self.producers.publish_invoice_paid(InvoicePaidEvent::new(recorded.invoice.clone()));
        }
    }
}
