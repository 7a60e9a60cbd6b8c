//! Coupon resolution and price quotes for plan purchases.
//!
//! A coupon code is resolved against the offers table first and the referral codes second. At most one path
//! applies. Offers discount the price; referral codes leave the price alone and reward the referrer instead.
use chrono::{DateTime, Utc};
use ledger_common::Money;
use log::*;
use serde::{Deserialize, Serialize};

use crate::db_types::{Offer, ReferralCode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Coupon {
    None,
    Offer(Offer),
    Referral(ReferralCode),
}

impl Coupon {
    pub fn code(&self) -> Option<&str> {
        match self {
            Coupon::None => None,
            Coupon::Offer(o) => Some(o.code.as_str()),
            Coupon::Referral(r) => Some(r.code.as_str()),
        }
    }

    pub fn referral(&self) -> Option<&ReferralCode> {
        match self {
            Coupon::Referral(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub gross: Money,
    pub discount: Money,
    pub payable: Money,
    pub coupon: Coupon,
}

/// Picks the coupon that applies to a purchase by `subscriber_id`, given the candidate offer and referral code that
/// matched the coupon code (if any).
///
/// Offers that are inactive or past their validity are ignored, in which case the referral code gets a chance.
/// Inactive referral codes and self-referrals resolve to no coupon.
pub fn resolve_coupon(
    code: &str,
    offer: Option<Offer>,
    referral: Option<ReferralCode>,
    subscriber_id: i64,
    now: DateTime<Utc>,
) -> Coupon {
    if let Some(offer) = offer {
        if offer.is_redeemable(now) {
            return Coupon::Offer(offer);
        }
        debug!("🎟️ Offer {code} is not redeemable at {now}");
    }
    match referral {
        Some(r) if !r.active => {
            info!("🎟️ Referral code {code} is inactive. No coupon applied");
            Coupon::None
        },
        Some(r) if r.referrer_id == subscriber_id => {
            warn!("🎟️ Subscriber #{subscriber_id} tried to use their own referral code {code}. No coupon applied");
            Coupon::None
        },
        Some(r) => Coupon::Referral(r),
        None => {
            info!("🎟️ Coupon code {code} does not match any redeemable offer or referral code");
            Coupon::None
        },
    }
}

/// Quotes the price of a plan under the given coupon. The payable amount is never negative.
pub fn quote(price: Money, coupon: Coupon) -> PriceQuote {
    let discount = match &coupon {
        Coupon::Offer(offer) => price.percentage(offer.discount_percent).min(price),
        Coupon::Referral(_) | Coupon::None => Money::zero(),
    };
    let payable = (price - discount).clamp_non_negative();
    PriceQuote { gross: price, discount, payable, coupon }
}
