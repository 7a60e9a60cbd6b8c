use chrono::{DateTime, NaiveDate, Utc};
use ledger_common::Money;
use sqlx::SqliteConnection;

use crate::db_types::{Invoice, InvoiceStatus, NewInvoice};

pub async fn insert_invoice(
    invoice: NewInvoice,
    invoice_number: &str,
    currency: &str,
    conn: &mut SqliteConnection,
) -> Result<Invoice, sqlx::Error> {
    let now = Utc::now();
    let total = invoice.total();
    let invoice = sqlx::query_as(
        r#"
            INSERT INTO invoices (
                invoice_number,
                customer_id,
                subtotal,
                tax,
                discount,
                total,
                amount_paid,
                currency,
                status,
                due_date,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING *;
        "#,
    )
    .bind(invoice_number)
    .bind(invoice.customer_id)
    .bind(invoice.subtotal)
    .bind(invoice.tax)
    .bind(invoice.discount)
    .bind(total)
    .bind(Money::zero())
    .bind(currency)
    .bind(InvoiceStatus::Draft)
    .bind(invoice.due_date)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(invoice)
}

pub async fn fetch_invoice(id: i64, conn: &mut SqliteConnection) -> Result<Option<Invoice>, sqlx::Error> {
    let invoice = sqlx::query_as("SELECT * FROM invoices WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(invoice)
}

pub async fn fetch_invoice_by_number(
    invoice_number: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Invoice>, sqlx::Error> {
    let invoice = sqlx::query_as("SELECT * FROM invoices WHERE invoice_number = $1")
        .bind(invoice_number)
        .fetch_optional(conn)
        .await?;
    Ok(invoice)
}

/// Touches the invoice row and returns it.
///
/// Call this as the first statement of a transaction. Because it is a write, it takes SQLite's write lock before
/// anything is read, so the returned row cannot change under the caller until the transaction ends. Returns `None` if
/// the invoice does not exist.
pub async fn lock_invoice(id: i64, conn: &mut SqliteConnection) -> Result<Option<Invoice>, sqlx::Error> {
    let invoice = sqlx::query_as("UPDATE invoices SET updated_at = $2 WHERE id = $1 RETURNING *")
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(conn)
        .await?;
    Ok(invoice)
}

/// Persists the outcome of a payment reconciliation.
pub async fn update_reconciliation(
    id: i64,
    amount_paid: Money,
    status: InvoiceStatus,
    paid_at: Option<DateTime<Utc>>,
    conn: &mut SqliteConnection,
) -> Result<Invoice, sqlx::Error> {
    let invoice = sqlx::query_as(
        r#"
        UPDATE invoices SET amount_paid = $2, status = $3, paid_at = $4, updated_at = $5
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(amount_paid)
    .bind(status)
    .bind(paid_at)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(invoice)
}

pub async fn mark_sent(id: i64, conn: &mut SqliteConnection) -> Result<Invoice, sqlx::Error> {
    let now = Utc::now();
    let invoice = sqlx::query_as(
        "UPDATE invoices SET status = $2, sent_at = $3, updated_at = $3 WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(InvoiceStatus::Sent)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(invoice)
}

pub async fn update_status(
    id: i64,
    status: InvoiceStatus,
    conn: &mut SqliteConnection,
) -> Result<Invoice, sqlx::Error> {
    let invoice = sqlx::query_as("UPDATE invoices SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *")
        .bind(id)
        .bind(status)
        .bind(Utc::now())
        .fetch_one(conn)
        .await?;
    Ok(invoice)
}

#[allow(clippy::too_many_arguments)]
pub async fn update_amounts(
    id: i64,
    subtotal: Money,
    tax: Money,
    discount: Money,
    total: Money,
    due_date: Option<NaiveDate>,
    conn: &mut SqliteConnection,
) -> Result<Invoice, sqlx::Error> {
    let invoice = sqlx::query_as(
        r#"
        UPDATE invoices SET subtotal = $2, tax = $3, discount = $4, total = $5, due_date = $6, updated_at = $7
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(subtotal)
    .bind(tax)
    .bind(discount)
    .bind(total)
    .bind(due_date)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(invoice)
}

pub async fn delete_invoice(id: i64, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM invoices WHERE id = $1").bind(id).execute(conn).await?;
    Ok(result.rows_affected())
}
