//! Primitives shared by the ledger engine and its gateway integrations.
mod money;

pub mod helpers;
pub mod op;
mod percent;
mod secret;

pub use money::{Money, MoneyConversionError, DEFAULT_CURRENCY_CODE};
pub use percent::{Percent, PercentOutOfRange};
pub use secret::Secret;
