use crate::{
    db_types::{Invoice, InvoicePayment, ModifyInvoiceRequest, NewInvoice, NewInvoicePayment},
    traits::{data_objects::PaymentRecorded, LedgerError},
};

/// Invoice lifecycle and payment reconciliation.
///
/// Every method that changes an invoice runs in a single database transaction that takes the write lock on the
/// invoice before reading it, so concurrent payments against the same invoice are applied one after the other.
#[allow(async_fn_in_trait)]
pub trait InvoiceManagement {
    /// Stores a new `Draft` invoice, allocating its `INV-` number in the same transaction.
    async fn insert_invoice(&self, invoice: NewInvoice) -> Result<Invoice, LedgerError>;

    async fn fetch_invoice(&self, id: i64) -> Result<Option<Invoice>, LedgerError>;

    async fn fetch_invoice_by_number(&self, invoice_number: &str) -> Result<Option<Invoice>, LedgerError>;

    /// All ledger lines for the invoice, including reversals, oldest first.
    async fn fetch_payments_for_invoice(&self, invoice_id: i64) -> Result<Vec<InvoicePayment>, LedgerError>;

    /// `Draft -> Sent`. Sending from any other state is rejected.
    async fn send_invoice(&self, id: i64) -> Result<Invoice, LedgerError>;

    /// Cancels an invoice that is not `Paid` and not already `Cancelled`.
    async fn cancel_invoice(&self, id: i64) -> Result<Invoice, LedgerError>;

    /// Edits the amounts or due date of an invoice that is neither `Paid` nor `Cancelled`. The total is recomputed,
    /// and may not drop below what has already been paid.
    async fn modify_invoice(&self, id: i64, changes: ModifyInvoiceRequest) -> Result<Invoice, LedgerError>;

    /// Hard-deletes an invoice that has no payments recorded against it.
    async fn delete_invoice(&self, id: i64) -> Result<(), LedgerError>;

    /// Records a payment against an invoice and reconciles the invoice, in one atomic transaction:
    /// * the payment row is inserted (its `reference` must be unique, otherwise nothing is written),
    /// * the invoice's paid amount is recomputed from all of its payment rows and checked against the previous value,
    /// * the status is re-derived (`Partial` or `Paid`) and `paid_at` set on settlement.
    async fn record_payment(&self, payment: NewInvoicePayment) -> Result<PaymentRecorded, LedgerError>;

    /// Reverses a previously recorded payment by appending a negative ledger line that references it. The invoice is
    /// reconciled exactly as for [`Self::record_payment`], except that the status may fall back to `Partial` or
    /// `Sent`.
    async fn reverse_payment(
        &self,
        payment_id: i64,
        reference: &str,
        reason: Option<String>,
    ) -> Result<PaymentRecorded, LedgerError>;
}
