//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`
//! argument. Callers can obtain a connection from a pool, or open a transaction and pass `&mut tx` through without any
//! other changes.
//!
//! Monetary columns hold decimal strings, so nothing here aggregates amounts in SQL. Rows are fetched and summed in
//! Rust.
use std::{env, str::FromStr, time::Duration};

use log::*;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod gateway_orders;
pub mod idempotency;
pub mod invoices;
pub mod orders;
pub mod otp;
pub mod payments;
pub mod plans;
pub mod referrals;
pub mod sequences;
pub mod subscribers;
pub mod subscriptions;
pub mod wallet;

const SQLITE_DB_URL: &str = "sqlite://data/ledger_store.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn db_url() -> String {
    let result = env::var("LEDGER_DATABASE_URL").unwrap_or_else(|_| {
        info!("LEDGER_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

/// Opens a connection pool. Writers that find the database locked wait for up to [`BUSY_TIMEOUT`] before failing.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

/// True if the error is a violation of a `UNIQUE` (or primary key) constraint.
pub fn is_unique_violation(e: &SqlxError) -> bool {
    matches!(e, SqlxError::Database(err) if err.is_unique_violation())
}
