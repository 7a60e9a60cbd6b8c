//! HTTP collaborators for the ledger engine.
//!
//! * [`RazorpayClient`] implements the engine's `PaymentGatewayClient`.
//! * [`HttpSmsClient`] implements `SmsSender` for OTP delivery.
//! * [`WorkflowClient`] posts ledger events to the workflow webhook service. [`create_workflow_event_handlers`] wires
//!   it up to the engine's event hooks.
mod api;
mod config;
mod error;
mod hooks;
mod sms;
mod workflow;

pub mod data_objects;
pub mod helpers;

pub use api::RazorpayClient;
pub use config::{GatewayConfig, SmsConfig, WorkflowConfig};
pub use error::{GatewayApiError, WorkflowError};
pub use hooks::create_workflow_event_handlers;
pub use sms::HttpSmsClient;
pub use workflow::{RetryPolicy, WorkflowClient, WorkflowEvent};
