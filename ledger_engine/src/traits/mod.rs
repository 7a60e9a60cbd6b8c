//! # Ledger backend contracts
//!
//! This module defines the behaviour that a database backend must provide in order to host the ledger engine.
//!
//! * [`SequenceManagement`] allocates collision-free business identifiers.
//! * [`InvoiceManagement`] manages the invoice lifecycle and reconciles invoice payments.
//! * [`SubscriptionManagement`] manages plans, coupons and subscribers, and activates subscriptions for captured
//!   payments.
//! * [`OtpManagement`] stores one-time passcodes for the login flow.
//! * [`LedgerDatabase`] ties them together.
//!
//! The [`PaymentGatewayClient`] and [`SmsSender`] traits describe the external collaborators used by the public APIs.
mod errors;
mod invoice_management;
mod otp_management;
mod payment_gateway;
mod sequence_management;
mod subscription_management;

pub mod data_objects;

pub use errors::{ErrorKind, LedgerError};
pub use invoice_management::InvoiceManagement;
pub use otp_management::{OtpApiError, OtpManagement};
pub use payment_gateway::{
    GatewayError,
    GatewayOrderInfo,
    GatewayOrderRequest,
    GatewayPaymentState,
    GatewayPlanRequest,
    GatewaySubscriptionInfo,
    PaymentGatewayClient,
    SmsSender,
};
pub use sequence_management::SequenceManagement;
pub use subscription_management::SubscriptionManagement;

/// The highest level of behaviour for backends supporting the ledger engine.
#[allow(async_fn_in_trait)]
pub trait LedgerDatabase:
    Clone + SequenceManagement + InvoiceManagement + SubscriptionManagement + OtpManagement
{
    /// The URL of the database
    fn url(&self) -> &str;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }
}
