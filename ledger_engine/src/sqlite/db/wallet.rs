use chrono::Utc;
use ledger_common::Money;
use sqlx::SqliteConnection;

use crate::db_types::{WalletEntry, WalletSource};

/// Adds a wallet entry unless one with the same subscriber, source and reference already exists, in which case
/// `None` is returned.
pub async fn insert_entry(
    subscriber_id: i64,
    amount: Money,
    source: WalletSource,
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<WalletEntry>, sqlx::Error> {
    let entry = sqlx::query_as(
        r#"
            INSERT INTO wallet_entries (subscriber_id, amount, source, reference, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (subscriber_id, source, reference) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(subscriber_id)
    .bind(amount)
    .bind(source)
    .bind(reference)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await?;
    Ok(entry)
}

pub async fn fetch_entry(
    subscriber_id: i64,
    source: WalletSource,
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<WalletEntry>, sqlx::Error> {
    let entry = sqlx::query_as(
        "SELECT * FROM wallet_entries WHERE subscriber_id = $1 AND source = $2 AND reference = $3",
    )
    .bind(subscriber_id)
    .bind(source)
    .bind(reference)
    .fetch_optional(conn)
    .await?;
    Ok(entry)
}

pub async fn fetch_entries(subscriber_id: i64, conn: &mut SqliteConnection) -> Result<Vec<WalletEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM wallet_entries WHERE subscriber_id = $1 ORDER BY id")
        .bind(subscriber_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

pub async fn balance(subscriber_id: i64, conn: &mut SqliteConnection) -> Result<Money, sqlx::Error> {
    let amounts: Vec<Money> = sqlx::query_scalar("SELECT amount FROM wallet_entries WHERE subscriber_id = $1")
        .bind(subscriber_id)
        .fetch_all(conn)
        .await?;
    Ok(amounts.into_iter().sum())
}
