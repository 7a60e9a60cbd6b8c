use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::{NewSubscriptionPlan, SubscriptionPlan};

pub async fn insert_plan(
    plan: NewSubscriptionPlan,
    currency: &str,
    conn: &mut SqliteConnection,
) -> Result<SubscriptionPlan, sqlx::Error> {
    let now = Utc::now();
    let plan = sqlx::query_as(
        r#"
            INSERT INTO subscription_plans (
                name,
                price,
                currency,
                duration_value,
                duration_unit,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *;
        "#,
    )
    .bind(plan.name)
    .bind(plan.price)
    .bind(currency)
    .bind(plan.duration_value)
    .bind(plan.duration_unit)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(plan)
}

pub async fn fetch_plan(id: i64, conn: &mut SqliteConnection) -> Result<Option<SubscriptionPlan>, sqlx::Error> {
    let plan =
        sqlx::query_as("SELECT * FROM subscription_plans WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(plan)
}

pub async fn set_active(
    id: i64,
    active: bool,
    conn: &mut SqliteConnection,
) -> Result<Option<SubscriptionPlan>, sqlx::Error> {
    let plan = sqlx::query_as("UPDATE subscription_plans SET active = $2, updated_at = $3 WHERE id = $1 RETURNING *")
        .bind(id)
        .bind(active)
        .bind(Utc::now())
        .fetch_optional(conn)
        .await?;
    Ok(plan)
}

pub async fn set_gateway_plan_id(
    id: i64,
    gateway_plan_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<SubscriptionPlan>, sqlx::Error> {
    let plan = sqlx::query_as(
        "UPDATE subscription_plans SET gateway_plan_id = $2, updated_at = $3 WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(gateway_plan_id)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await?;
    Ok(plan)
}
