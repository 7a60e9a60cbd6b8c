//! Orders and order lines for plan purchases.
use chrono::Utc;
use ledger_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Order, OrderLine, OrderStatus},
    helpers::PriceQuote,
};

pub async fn fetch_order_by_transaction_id(
    transaction_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE transaction_id = $1")
        .bind(transaction_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn insert_order(
    order_number: &str,
    subscriber_id: i64,
    transaction_id: &str,
    gateway_order_id: Option<&str>,
    quote: &PriceQuote,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let now = Utc::now();
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_number,
                subscriber_id,
                transaction_id,
                gateway_order_id,
                gross_amount,
                discount_amount,
                amount,
                coupon_code,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING *;
        "#,
    )
    .bind(order_number)
    .bind(subscriber_id)
    .bind(transaction_id)
    .bind(gateway_order_id)
    .bind(quote.gross)
    .bind(quote.discount)
    .bind(quote.payable)
    .bind(quote.coupon.code())
    .bind(OrderStatus::Success)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

/// Brings an existing order (e.g. one left `Pending` by an earlier attempt) in line with the latest reconciliation.
pub async fn update_order(
    id: i64,
    gateway_order_id: Option<&str>,
    quote: &PriceQuote,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
        UPDATE orders SET
            gateway_order_id = COALESCE($2, gateway_order_id),
            gross_amount = $3,
            discount_amount = $4,
            amount = $5,
            coupon_code = $6,
            status = $7,
            updated_at = $8
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(gateway_order_id)
    .bind(quote.gross)
    .bind(quote.discount)
    .bind(quote.payable)
    .bind(quote.coupon.code())
    .bind(OrderStatus::Success)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(order)
}

/// Inserts the line for `plan_id` on the order, or updates it if the order already has one.
pub async fn upsert_order_line(
    order_id: i64,
    plan_id: i64,
    unit_price: Money,
    discount: Money,
    conn: &mut SqliteConnection,
) -> Result<OrderLine, sqlx::Error> {
    let now = Utc::now();
    let total = (unit_price - discount).clamp_non_negative();
    let line = sqlx::query_as(
        r#"
            INSERT INTO order_lines (order_id, plan_id, quantity, unit_price, discount, total, created_at, updated_at)
            VALUES ($1, $2, 1, $3, $4, $5, $6, $6)
            ON CONFLICT (order_id, plan_id) DO UPDATE SET
                unit_price = excluded.unit_price,
                discount = excluded.discount,
                total = excluded.total,
                updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(plan_id)
    .bind(unit_price)
    .bind(discount)
    .bind(total)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(line)
}

pub async fn fetch_order_lines(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderLine>, sqlx::Error> {
    let lines = sqlx::query_as("SELECT * FROM order_lines WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(lines)
}
