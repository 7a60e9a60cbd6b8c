use chrono::Utc;
use log::*;
use sqlx::SqliteConnection;

use crate::helpers::{format_id, parse_suffix, SequenceScope};

/// Advances the counter for `scope` in a single statement and returns the formatted identifier.
///
/// The upsert both creates the row on first use and increments it thereafter, so there is no read-then-write window.
/// Run this on the caller's transaction so that a rolled back transaction does not consume the identifier.
pub async fn allocate(scope: &SequenceScope, conn: &mut SqliteConnection) -> Result<String, sqlx::Error> {
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sequences (scope, last_value, updated_at) VALUES ($1, 1, $2)
        ON CONFLICT (scope) DO UPDATE SET last_value = last_value + 1, updated_at = excluded.updated_at
        RETURNING last_value
        "#,
    )
    .bind(scope.key())
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    let id = format_id(scope, value);
    trace!("🔢 Allocated {id} in scope {scope}");
    Ok(id)
}

/// Raises the counter for `scope` to the trailing number of `last_issued`. Counters never move backwards.
pub async fn seed(scope: &SequenceScope, last_issued: &str, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let seed_value = parse_suffix(last_issued).unwrap_or_else(|| {
        warn!("🔢 Cannot parse a counter from {last_issued}. Scope {scope} keeps its default");
        0
    });
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sequences (scope, last_value, updated_at) VALUES ($1, $2, $3)
        ON CONFLICT (scope) DO UPDATE SET
            last_value = MAX(last_value, excluded.last_value),
            updated_at = excluded.updated_at
        RETURNING last_value
        "#,
    )
    .bind(scope.key())
    .bind(seed_value)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    debug!("🔢 Scope {scope} seeded from {last_issued}. Counter is now {value}");
    Ok(value)
}

pub async fn current_value(scope: &SequenceScope, conn: &mut SqliteConnection) -> Result<Option<i64>, sqlx::Error> {
    let value = sqlx::query_scalar("SELECT last_value FROM sequences WHERE scope = $1")
        .bind(scope.key())
        .fetch_optional(conn)
        .await?;
    Ok(value)
}
