//! Offers, referral codes and referral credits.
use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::{NewOffer, NewReferralCode, Offer, ReferralCode, ReferralCredit};

pub async fn insert_offer(offer: NewOffer, conn: &mut SqliteConnection) -> Result<Offer, sqlx::Error> {
    let offer = sqlx::query_as(
        r#"
            INSERT INTO offers (code, discount_percent, valid_until, created_at) VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(offer.code)
    .bind(offer.discount_percent)
    .bind(offer.valid_until)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(offer)
}

pub async fn fetch_offer_by_code(code: &str, conn: &mut SqliteConnection) -> Result<Option<Offer>, sqlx::Error> {
    let offer = sqlx::query_as("SELECT * FROM offers WHERE code = $1").bind(code).fetch_optional(conn).await?;
    Ok(offer)
}

pub async fn insert_referral_code(
    code: NewReferralCode,
    conn: &mut SqliteConnection,
) -> Result<ReferralCode, sqlx::Error> {
    let code = sqlx::query_as(
        r#"
            INSERT INTO referral_codes (code, referrer_id, reward_amount, created_at) VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(code.code)
    .bind(code.referrer_id)
    .bind(code.reward_amount)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(code)
}

pub async fn fetch_referral_code(code: &str, conn: &mut SqliteConnection) -> Result<Option<ReferralCode>, sqlx::Error> {
    let code =
        sqlx::query_as("SELECT * FROM referral_codes WHERE code = $1").bind(code).fetch_optional(conn).await?;
    Ok(code)
}

/// Records a referral credit unless this referrer has already been credited for this referred subscriber and code.
/// Returns `None` (and writes nothing) in that case.
pub async fn insert_referral_credit(
    code: &ReferralCode,
    referred_id: i64,
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<ReferralCredit>, sqlx::Error> {
    let credit = sqlx::query_as(
        r#"
            INSERT INTO referral_credits (referrer_id, referred_id, code, order_id, amount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (referrer_id, referred_id, code) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(code.referrer_id)
    .bind(referred_id)
    .bind(code.code.as_str())
    .bind(order_id)
    .bind(code.reward_amount)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await?;
    Ok(credit)
}

pub async fn fetch_credits_for_referrer(
    referrer_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<ReferralCredit>, sqlx::Error> {
    let credits = sqlx::query_as("SELECT * FROM referral_credits WHERE referrer_id = $1 ORDER BY id")
        .bind(referrer_id)
        .fetch_all(conn)
        .await?;
    Ok(credits)
}
