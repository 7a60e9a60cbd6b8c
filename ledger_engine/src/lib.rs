//! Subscription Ledger Engine
//!
//! The ledger engine keeps the financial books for a subscription business: invoices and the payments made against
//! them, plan purchases and the subscriptions they activate, referral and promo credits, and the human-readable
//! identifiers that tie all of these together.
//!
//! The library is divided into three main sections:
//! 1. The backend contracts ([`mod@traits`]) and their SQLite implementation. Every operation that derives new state
//!    from stored state runs in a single database transaction, so that concurrent and repeated requests (webhook
//!    retries, double clicks) never double-count money. The data types stored in the database are defined in
//!    [`mod@db_types`] and are public.
//! 2. The public API ([`InvoiceApi`], [`SubscriptionFlowApi`], [`SequenceApi`], [`OtpApi`]). These wrap a backend and
//!    are what callers should use.
//! 3. Events ([`mod@events`]). The APIs publish events after their transaction commits. Handlers run on their own
//!    tasks, so notification failures never affect the books.
mod ledger_api;

pub mod config;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use config::EngineConfig;
pub use ledger_api::{
    invoice_api::InvoiceApi,
    otp_api::OtpApi,
    sequence_api::SequenceApi,
    subscription_flow_api::SubscriptionFlowApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    data_objects,
    ErrorKind,
    InvoiceManagement,
    LedgerDatabase,
    LedgerError,
    OtpApiError,
    OtpManagement,
    PaymentGatewayClient,
    SequenceManagement,
    SmsSender,
    SubscriptionManagement,
};
