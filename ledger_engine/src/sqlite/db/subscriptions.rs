use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{Order, Subscription};

pub async fn insert_subscription(
    subscription_code: &str,
    order: &Order,
    plan_id: i64,
    start_date: DateTime<Utc>,
    expiry_date: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Subscription, sqlx::Error> {
    let subscription = sqlx::query_as(
        r#"
            INSERT INTO subscriptions (
                subscription_code,
                subscriber_id,
                plan_id,
                order_id,
                amount,
                start_date,
                expiry_date,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(subscription_code)
    .bind(order.subscriber_id)
    .bind(plan_id)
    .bind(order.id)
    .bind(order.amount)
    .bind(start_date)
    .bind(expiry_date)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(subscription)
}

pub async fn fetch_subscription(id: i64, conn: &mut SqliteConnection) -> Result<Option<Subscription>, sqlx::Error> {
    let subscription =
        sqlx::query_as("SELECT * FROM subscriptions WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(subscription)
}

pub async fn fetch_subscription_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Subscription>, sqlx::Error> {
    let subscription = sqlx::query_as("SELECT * FROM subscriptions WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(subscription)
}

pub async fn fetch_subscriptions_for_subscriber(
    subscriber_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Subscription>, sqlx::Error> {
    let subscriptions = sqlx::query_as("SELECT * FROM subscriptions WHERE subscriber_id = $1 ORDER BY id")
        .bind(subscriber_id)
        .fetch_all(conn)
        .await?;
    Ok(subscriptions)
}
