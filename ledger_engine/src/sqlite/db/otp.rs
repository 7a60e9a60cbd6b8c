use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::OtpRecord;

pub async fn insert_otp(mobile: &str, code_hash: &str, conn: &mut SqliteConnection) -> Result<OtpRecord, sqlx::Error> {
    let record = sqlx::query_as("INSERT INTO otp_log (mobile, code_hash, created_at) VALUES ($1, $2, $3) RETURNING *")
        .bind(mobile)
        .bind(code_hash)
        .bind(Utc::now())
        .fetch_one(conn)
        .await?;
    Ok(record)
}

pub async fn latest_for_mobile(mobile: &str, conn: &mut SqliteConnection) -> Result<Option<OtpRecord>, sqlx::Error> {
    let record = sqlx::query_as("SELECT * FROM otp_log WHERE mobile = $1 ORDER BY id DESC LIMIT 1")
        .bind(mobile)
        .fetch_optional(conn)
        .await?;
    Ok(record)
}

/// Returns `true` if this call consumed the OTP, `false` if it had already been used.
pub async fn consume(id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE otp_log SET consumed_at = $2 WHERE id = $1 AND consumed_at IS NULL")
        .bind(id)
        .bind(Utc::now())
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}
