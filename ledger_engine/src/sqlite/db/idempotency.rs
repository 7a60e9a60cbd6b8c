//! The processed-transactions ledger that makes subscription activation idempotent.
use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::ProcessedTransaction;

/// Claims `transaction_id`, creating its row on first sight and bumping `last_seen_at` otherwise.
///
/// This is a write, so as the first statement of a transaction it also serialises concurrent activations for the same
/// payment: the second caller waits for the first to commit and then sees its result.
pub async fn claim(transaction_id: &str, conn: &mut SqliteConnection) -> Result<ProcessedTransaction, sqlx::Error> {
    let now = Utc::now();
    let row = sqlx::query_as(
        r#"
            INSERT INTO processed_transactions (transaction_id, created_at, last_seen_at) VALUES ($1, $2, $2)
            ON CONFLICT (transaction_id) DO UPDATE SET last_seen_at = excluded.last_seen_at
            RETURNING *;
        "#,
    )
    .bind(transaction_id)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn complete(
    transaction_id: &str,
    order_id: i64,
    subscription_id: i64,
    conn: &mut SqliteConnection,
) -> Result<ProcessedTransaction, sqlx::Error> {
    let row = sqlx::query_as(
        r#"
        UPDATE processed_transactions SET order_id = $2, subscription_id = $3, last_seen_at = $4
        WHERE transaction_id = $1
        RETURNING *
        "#,
    )
    .bind(transaction_id)
    .bind(order_id)
    .bind(subscription_id)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(row)
}
