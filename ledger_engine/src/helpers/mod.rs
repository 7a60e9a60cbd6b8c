mod invoice_status;
mod otp;
mod pricing;
mod sequence_format;

pub use invoice_status::{accepts_payments, derive_status};
pub use otp::{generate_code, hash_code, normalize_mobile, OTP_LENGTH};
pub use pricing::{quote, resolve_coupon, Coupon, PriceQuote};
pub use sequence_format::{format_id, parse_suffix, FiscalYear, SequenceScope, DEFAULT_WIDTH};
