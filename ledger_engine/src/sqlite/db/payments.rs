use chrono::Utc;
use ledger_common::Money;
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{InvoicePayment, NewInvoicePayment},
    traits::LedgerError,
};

/// Appends a line to the invoice payment ledger.
///
/// The `reference` column is unique, so a replayed payment fails here with [`LedgerError::DuplicatePayment`] before
/// anything else is written. Likewise, a payment can only be reversed once.
pub async fn insert_payment(
    payment: NewInvoicePayment,
    reversal_of: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<InvoicePayment, LedgerError> {
    let reference = payment.reference.clone();
    let result = sqlx::query_as(
        r#"
            INSERT INTO invoice_payments (
                invoice_id,
                amount,
                mode,
                reference,
                paid_on,
                recorded_by,
                reversal_of,
                note,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(payment.invoice_id)
    .bind(payment.amount)
    .bind(payment.mode)
    .bind(payment.reference)
    .bind(payment.paid_on)
    .bind(payment.recorded_by)
    .bind(reversal_of)
    .bind(payment.note)
    .bind(Utc::now())
    .fetch_one(conn)
    .await;
    match result {
        Ok(p) => Ok(p),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            if e.message().contains("reversal_of") {
                debug!("🧾 Payment {reversal_of:?} has already been reversed");
                Err(LedgerError::Conflict(format!("Payment {} has already been reversed", reversal_of.unwrap_or(0))))
            } else {
                debug!("🧾 Payment reference {reference} has already been recorded");
                Err(LedgerError::DuplicatePayment(reference))
            }
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_payment(id: i64, conn: &mut SqliteConnection) -> Result<Option<InvoicePayment>, sqlx::Error> {
    let payment =
        sqlx::query_as("SELECT * FROM invoice_payments WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(payment)
}

pub async fn fetch_payments_for_invoice(
    invoice_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<InvoicePayment>, sqlx::Error> {
    let payments = sqlx::query_as("SELECT * FROM invoice_payments WHERE invoice_id = $1 ORDER BY id")
        .bind(invoice_id)
        .fetch_all(conn)
        .await?;
    Ok(payments)
}

/// Sums every ledger line (payments and reversals) for the invoice.
pub async fn total_paid_for_invoice(invoice_id: i64, conn: &mut SqliteConnection) -> Result<Money, sqlx::Error> {
    let amounts: Vec<Money> = sqlx::query_scalar("SELECT amount FROM invoice_payments WHERE invoice_id = $1")
        .bind(invoice_id)
        .fetch_all(conn)
        .await?;
    Ok(amounts.into_iter().sum())
}

pub async fn count_payments_for_invoice(invoice_id: i64, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM invoice_payments WHERE invoice_id = $1")
        .bind(invoice_id)
        .fetch_one(conn)
        .await?;
    Ok(count)
}
