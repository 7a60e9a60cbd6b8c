use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::{NewSubscriber, Subscriber};

pub async fn insert_subscriber(
    subscriber: NewSubscriber,
    subscriber_code: &str,
    conn: &mut SqliteConnection,
) -> Result<Subscriber, sqlx::Error> {
    let now = Utc::now();
    let subscriber = sqlx::query_as(
        r#"
            INSERT INTO subscribers (subscriber_code, mobile, name, email, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *;
        "#,
    )
    .bind(subscriber_code)
    .bind(subscriber.mobile)
    .bind(subscriber.name)
    .bind(subscriber.email)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(subscriber)
}

/// Inserts a subscriber for `mobile` unless one is already registered, in which case `None` is returned and nothing
/// is written.
pub async fn insert_subscriber_for_mobile(
    mobile: &str,
    subscriber_code: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Subscriber>, sqlx::Error> {
    let now = Utc::now();
    let subscriber = sqlx::query_as(
        r#"
            INSERT INTO subscribers (subscriber_code, mobile, created_at, updated_at) VALUES ($1, $2, $3, $3)
            ON CONFLICT (mobile) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(subscriber_code)
    .bind(mobile)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(subscriber)
}

pub async fn fetch_subscriber(id: i64, conn: &mut SqliteConnection) -> Result<Option<Subscriber>, sqlx::Error> {
    let subscriber = sqlx::query_as("SELECT * FROM subscribers WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(subscriber)
}

pub async fn fetch_subscriber_by_mobile(
    mobile: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Subscriber>, sqlx::Error> {
    let subscriber =
        sqlx::query_as("SELECT * FROM subscribers WHERE mobile = $1").bind(mobile).fetch_optional(conn).await?;
    Ok(subscriber)
}
