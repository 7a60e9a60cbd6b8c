//! Invoice status derivation.
//!
//! An invoice's persisted status is a pure function of its previous status and the amount paid against its total.
//! Keeping the rules in one place means `record_payment` and `reverse_payment` cannot drift apart.
use ledger_common::Money;

use crate::db_types::InvoiceStatus;

/// Derives the status an invoice should have once `amount_paid` has been received against `total`.
///
/// * `Cancelled` is terminal and never changes.
/// * `amount_paid >= total` (with something actually paid) gives `Paid`.
/// * Any positive amount short of the total gives `Partial`.
/// * If nothing (net) has been paid, an invoice that was `Partial` or `Paid` falls back to `Sent`. `Draft` and `Sent`
///   are left as they are.
pub fn derive_status(current: InvoiceStatus, amount_paid: Money, total: Money) -> InvoiceStatus {
    use InvoiceStatus::*;
    match current {
        Cancelled => Cancelled,
        _ if amount_paid.is_positive() && amount_paid >= total => Paid,
        _ if amount_paid.is_positive() => Partial,
        Partial | Paid => Sent,
        other => other,
    }
}

/// Whether an invoice in the `current` state accepts new payments.
pub fn accepts_payments(current: InvoiceStatus) -> bool {
    !matches!(current, InvoiceStatus::Cancelled)
}
