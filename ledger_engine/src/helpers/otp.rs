//! One-time passcode helpers: generation, hashing and mobile number normalisation.
//!
//! Codes are never stored in the clear. The database keeps the hex-encoded Blake2b-512 digest of the code, and
//! verification compares digests.
use blake2::{Blake2b512, Digest};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

pub const OTP_LENGTH: usize = 6;

static E164: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[1-9]\d{7,14}$").expect("E.164 regex is valid"));
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9]\d{7,14}$").expect("digit regex is valid"));
static LOCAL_MOBILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[6-9]\d{9}$").expect("mobile regex is valid"));

/// Generates a uniformly random numeric code of [`OTP_LENGTH`] digits. Leading zeroes are allowed.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..OTP_LENGTH).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect()
}

pub fn hash_code(mobile: &str, code: &str) -> String {
    let mut hasher = Blake2b512::new();
    hasher.update(mobile.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

/// Normalises a mobile number to E.164 form.
///
/// Spaces, dashes and brackets are removed. Ten-digit Indian mobile numbers get the `+91` country code. Anything
/// else must already be a plausible international number, with or without the leading `+`.
pub fn normalize_mobile(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, ' ' | '-' | '(' | ')')).collect();
    if E164.is_match(&cleaned) {
        return Some(cleaned);
    }
    if LOCAL_MOBILE.is_match(&cleaned) {
        return Some(format!("+91{cleaned}"));
    }
    if DIGITS.is_match(&cleaned) {
        return Some(format!("+{cleaned}"));
    }
    None
}
