use thiserror::Error;

use crate::{
    db_types::{OtpRecord, Subscriber},
    traits::LedgerError,
};

#[derive(Debug, Clone, Error)]
pub enum OtpApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("{0} is not a valid mobile number")]
    InvalidMobile(String),
    #[error("No one-time passcode has been requested for this number")]
    NoOtpRequested,
    #[error("The one-time passcode does not match")]
    InvalidOtp,
    #[error("The one-time passcode has expired")]
    OtpExpired,
    #[error("The one-time passcode has already been used")]
    OtpAlreadyUsed,
}

impl From<LedgerError> for OtpApiError {
    fn from(e: LedgerError) -> Self {
        OtpApiError::DatabaseError(e.to_string())
    }
}

impl From<sqlx::Error> for OtpApiError {
    fn from(e: sqlx::Error) -> Self {
        OtpApiError::DatabaseError(e.to_string())
    }
}

/// Storage for the OTP login flow.
#[allow(async_fn_in_trait)]
pub trait OtpManagement {
    /// Returns the subscriber registered with `mobile`, creating one (with a new `SG` code) if there is none. The
    /// second element is `true` if the subscriber was created by this call.
    ///
    /// Concurrent calls for the same number all resolve to the same subscriber.
    async fn fetch_or_create_subscriber_for_mobile(&self, mobile: &str) -> Result<(Subscriber, bool), OtpApiError>;

    async fn fetch_subscriber_by_mobile(&self, mobile: &str) -> Result<Option<Subscriber>, OtpApiError>;

    async fn insert_otp(&self, mobile: &str, code_hash: &str) -> Result<OtpRecord, OtpApiError>;

    /// The most recently issued OTP for `mobile`, consumed or not.
    async fn latest_otp_for_mobile(&self, mobile: &str) -> Result<Option<OtpRecord>, OtpApiError>;

    /// Marks the OTP as used. Returns `false` if it had already been consumed.
    async fn consume_otp(&self, otp_id: i64) -> Result<bool, OtpApiError>;
}
