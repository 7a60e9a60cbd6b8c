use ledger_engine::traits::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Invalid REST request: {0}")]
    RestRequestError(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, code: Option<String>, message: String },
    #[error("Invalid currency amount: {0}")]
    InvalidCurrencyAmount(String),
    #[error("Unsupported value from the gateway: {0}")]
    UnsupportedValue(String),
}

impl From<GatewayApiError> for GatewayError {
    fn from(e: GatewayApiError) -> Self {
        match e {
            GatewayApiError::QueryError { status, code, message } => {
                GatewayError::new(message).with_code(code.unwrap_or_else(|| status.to_string()))
            },
            e => GatewayError::new(e.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Could not deliver workflow event: {0}")]
    DeliveryFailed(String),
    #[error("The workflow service rejected the event. Error {status}. {message}")]
    Rejected { status: u16, message: String },
}

impl WorkflowError {
    /// Transport failures, server errors and rate limiting are worth another attempt. Anything else will fail the
    /// same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::Initialization(_) => false,
            WorkflowError::DeliveryFailed(_) => true,
            WorkflowError::Rejected { status, .. } => *status >= 500 || *status == 429,
        }
    }
}

impl From<WorkflowError> for GatewayError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::Rejected { status, message } => GatewayError::new(message).with_code(status.to_string()),
            e => GatewayError::new(e.to_string()),
        }
    }
}
