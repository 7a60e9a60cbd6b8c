//! # Ledger engine public API
//!
//! The `ledger_api` module exposes the programmatic API for the ledger engine. Each API is generic over the backend
//! traits it needs, so that clients can pick the functionality they want.
//!
//! * [`invoice_api`] manages invoices and reconciles invoice payments.
//! * [`subscription_flow_api`] handles plan checkout and subscription activation.
//! * [`sequence_api`] allocates business identifiers.
//! * [`otp_api`] provides the mobile-number OTP login flow.
//!
//! # API usage
//!
//! ```rust,ignore
//! use ledger_engine::{events::EventHandlers, EngineConfig, InvoiceApi, SqliteDatabase};
//! let config = EngineConfig::from_env_or_default();
//! let db = SqliteDatabase::from_config(&config).await?;
//! let handlers = EventHandlers::new(config.event_buffer_size, hooks);
//! let api = InvoiceApi::with_producers(db, handlers.producers());
//! let invoice = api.record_payment(payment).await?;
//! ```
pub mod invoice_api;
pub mod otp_api;
pub mod sequence_api;
pub mod subscription_flow_api;
