use std::{fmt::Debug, time::Duration};

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{OtpRecord, Subscriber},
    helpers::{generate_code, hash_code, normalize_mobile},
    traits::{OtpApiError, OtpManagement, SmsSender},
};

/// Mobile-number login with one-time passcodes.
///
/// `request_otp` registers the number if it is new and texts a fresh code to it. `verify_otp` checks a code against
/// the most recent one issued for the number. Codes are single-use, and expire after `otp_validity` (if set).
/// Issuing session tokens for the returned subscriber is up to the caller.
pub struct OtpApi<B, S> {
    db: B,
    sms: S,
    otp_validity: Option<Duration>,
}

impl<B: Debug, S> Debug for OtpApi<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OtpApi ({:?}, validity {:?})", self.db, self.otp_validity)
    }
}

impl<B, S> OtpApi<B, S> {
    pub fn new(db: B, sms: S, otp_validity: Option<Duration>) -> Self {
        Self { db, sms, otp_validity }
    }

    pub fn otp_validity(&self) -> Option<Duration> {
        self.otp_validity
    }

    fn is_expired(&self, record: &OtpRecord, now: DateTime<Utc>) -> bool {
        match self.otp_validity.and_then(|v| chrono::Duration::from_std(v).ok()) {
            Some(validity) => now > record.created_at + validity,
            None => false,
        }
    }
}

impl<B, S> OtpApi<B, S>
where
    B: OtpManagement,
    S: SmsSender,
{
    /// Issues a new OTP for `mobile`, creating a subscriber for the number if there isn't one yet.
    ///
    /// Delivery is best-effort: if the SMS cannot be sent, the failure is logged and the OTP stays valid, so the user
    /// can simply ask for another.
    pub async fn request_otp(&self, mobile: &str) -> Result<Subscriber, OtpApiError> {
        let mobile = normalize_mobile(mobile).ok_or_else(|| OtpApiError::InvalidMobile(mobile.to_string()))?;
        let (subscriber, created) = self.db.fetch_or_create_subscriber_for_mobile(&mobile).await?;
        if created {
            debug!("🔑 Subscriber {} registered on first OTP request", subscriber.subscriber_code);
        }
        let code = generate_code();
        let record = self.db.insert_otp(&mobile, &hash_code(&mobile, &code)).await?;
        trace!("🔑 OTP #{} issued for subscriber {}", record.id, subscriber.subscriber_code);
        let message = match self.otp_validity {
            Some(v) => format!("Your verification code is {code}. It is valid for {} minutes.", v.as_secs() / 60),
            None => format!("Your verification code is {code}."),
        };
        if let Err(e) = self.sms.send_sms(&mobile, &message).await {
            warn!("🔑 Could not deliver OTP #{} to subscriber {}. {e}", record.id, subscriber.subscriber_code);
        }
        Ok(subscriber)
    }

    /// Checks `code` against the latest OTP issued for `mobile`. On success the OTP is consumed and the subscriber
    /// is returned.
    pub async fn verify_otp(&self, mobile: &str, code: &str) -> Result<Subscriber, OtpApiError> {
        let mobile = normalize_mobile(mobile).ok_or_else(|| OtpApiError::InvalidMobile(mobile.to_string()))?;
        let record = self.db.latest_otp_for_mobile(&mobile).await?.ok_or(OtpApiError::NoOtpRequested)?;
        if record.code_hash != hash_code(&mobile, code.trim()) {
            debug!("🔑 OTP #{} did not match", record.id);
            return Err(OtpApiError::InvalidOtp);
        }
        if record.is_consumed() {
            return Err(OtpApiError::OtpAlreadyUsed);
        }
        if self.is_expired(&record, Utc::now()) {
            debug!("🔑 OTP #{} was issued at {} and has expired", record.id, record.created_at);
            return Err(OtpApiError::OtpExpired);
        }
        // Two concurrent verifications of the same code: only one of them consumes it
        if !self.db.consume_otp(record.id).await? {
            return Err(OtpApiError::OtpAlreadyUsed);
        }
        let subscriber = self.db.fetch_subscriber_by_mobile(&mobile).await?.ok_or_else(|| {
            OtpApiError::DatabaseError(format!("No subscriber is registered for OTP #{}", record.id))
        })?;
        info!("🔑 Subscriber {} logged in with OTP #{}", subscriber.subscriber_code, record.id);
        Ok(subscriber)
    }
}
