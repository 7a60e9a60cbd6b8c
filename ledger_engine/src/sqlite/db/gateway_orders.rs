use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{GatewayOrder, GatewayOrderStatus, NewGatewayOrder};

pub async fn insert_gateway_order(
    order: NewGatewayOrder,
    conn: &mut SqliteConnection,
) -> Result<GatewayOrder, sqlx::Error> {
    let now = Utc::now();
    let order = sqlx::query_as(
        r#"
            INSERT INTO gateway_orders (
                gateway_order_id,
                subscriber_id,
                plan_id,
                gross_amount,
                amount,
                currency,
                coupon_code,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *;
        "#,
    )
    .bind(order.gateway_order_id)
    .bind(order.subscriber_id)
    .bind(order.plan_id)
    .bind(order.gross_amount)
    .bind(order.amount)
    .bind(order.currency)
    .bind(order.coupon_code)
    .bind(GatewayOrderStatus::Created)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_gateway_order(
    gateway_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<GatewayOrder>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM gateway_orders WHERE gateway_order_id = $1")
        .bind(gateway_order_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Write-first read of a gateway order, for use at the start of a transaction.
pub async fn lock_gateway_order(
    gateway_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<GatewayOrder>, sqlx::Error> {
    let order = sqlx::query_as("UPDATE gateway_orders SET updated_at = $2 WHERE gateway_order_id = $1 RETURNING *")
        .bind(gateway_order_id)
        .bind(Utc::now())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn mark_succeeded(
    gateway_order_id: &str,
    transaction_id: &str,
    paid_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<GatewayOrder, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
        UPDATE gateway_orders SET status = $2, transaction_id = $3, paid_at = $4, failure_reason = NULL, updated_at = $5
        WHERE gateway_order_id = $1
        RETURNING *
        "#,
    )
    .bind(gateway_order_id)
    .bind(GatewayOrderStatus::Succeeded)
    .bind(transaction_id)
    .bind(paid_at)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub async fn mark_failed(
    gateway_order_id: &str,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<GatewayOrder, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
        UPDATE gateway_orders SET status = $2, failure_reason = $3, updated_at = $4
        WHERE gateway_order_id = $1
        RETURNING *
        "#,
    )
    .bind(gateway_order_id)
    .bind(GatewayOrderStatus::Failed)
    .bind(reason)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(order)
}
