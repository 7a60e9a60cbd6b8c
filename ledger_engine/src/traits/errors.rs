use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{db_types::InvoiceStatus, traits::GatewayError};

/// A stable, machine-readable classification of [`LedgerError`]s, suitable for mapping onto transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    ExternalDependency,
    InvariantViolation,
    Internal,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ExternalDependency => "external_dependency",
            ErrorKind::InvariantViolation => "invariant_violation",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("Invalid request. {0}")]
    Validation(String),
    #[error("The requested invoice (id {0}) does not exist")]
    InvoiceNotFound(i64),
    #[error("The requested invoice payment (id {0}) does not exist")]
    PaymentNotFound(i64),
    #[error("The requested subscriber (id {0}) does not exist")]
    SubscriberNotFound(i64),
    #[error("The requested plan (id {0}) does not exist")]
    PlanNotFound(i64),
    #[error("The requested gateway order {0} does not exist")]
    GatewayOrderNotFound(String),
    #[error("A payment with reference {0} has already been recorded")]
    DuplicatePayment(String),
    #[error("Cannot {action} an invoice that is {status}")]
    InvalidStatusTransition { status: InvoiceStatus, action: &'static str },
    #[error("Conflicting request. {0}")]
    Conflict(String),
    #[error("Payment gateway error. {0}")]
    Gateway(#[from] GatewayError),
    #[error("Ledger invariant violated. {0}")]
    InvariantViolation(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        use LedgerError::*;
        match self {
            DatabaseError(_) => ErrorKind::Internal,
            Validation(_) => ErrorKind::Validation,
            InvoiceNotFound(_) |
            PaymentNotFound(_) |
            SubscriberNotFound(_) |
            PlanNotFound(_) |
            GatewayOrderNotFound(_) => ErrorKind::NotFound,
            DuplicatePayment(_) | InvalidStatusTransition { .. } | Conflict(_) => ErrorKind::Conflict,
            Gateway(_) => ErrorKind::ExternalDependency,
            InvariantViolation(_) => ErrorKind::InvariantViolation,
        }
    }

    /// Whether the same request may succeed if it is retried later, unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::ExternalDependency | ErrorKind::Internal)
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}
