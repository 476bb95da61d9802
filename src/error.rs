use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unsupported currency pair: {0}")]
    UnsupportedPair(String),

    #[error("Recipient mismatch: expected {expected}, got {actual}")]
    RecipientMismatch { expected: String, actual: String },

    #[error("Amount mismatch: expected {expected} wei, got {actual} wei")]
    AmountMismatch { expected: String, actual: String },

    #[error("Transaction lookup failed: {0}")]
    TransientLookupFailure(String),

    #[error("Payment request expired")]
    Expired,

    #[error("Payment request signature is invalid")]
    InvalidSignature,

    #[error("Transaction failed onchain")]
    TransactionFailed,

    #[error("Malformed deeplink: {0}")]
    MalformedDeeplink(String),

    #[error("Invalid transaction hash: {0}")]
    InvalidTxHash(String),

    #[error("RPC error: {0}")]
    RpcError(#[from] ethers::providers::ProviderError),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
}

impl PaymentError {
    /// Whether the caller may retry the same check later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentError::TransientLookupFailure(_) | PaymentError::RpcError(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            PaymentError::MissingField(_) => "MISSING_FIELD",
            PaymentError::InvalidAmount(_) => "INVALID_AMOUNT",
            PaymentError::UnsupportedPair(_) => "UNSUPPORTED_PAIR",
            PaymentError::RecipientMismatch { .. } => "RECIPIENT_MISMATCH",
            PaymentError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            PaymentError::TransientLookupFailure(_) => "TRANSIENT_LOOKUP_FAILURE",
            PaymentError::Expired => "EXPIRED",
            PaymentError::InvalidSignature => "INVALID_SIGNATURE",
            PaymentError::TransactionFailed => "TRANSACTION_FAILED",
            PaymentError::MalformedDeeplink(_) => "MALFORMED_DEEPLINK",
            PaymentError::InvalidTxHash(_) => "INVALID_TX_HASH",
            PaymentError::RpcError(_) => "UPSTREAM_ERROR",
            PaymentError::CacheError(_)
            | PaymentError::ConfigError(_)
            | PaymentError::InternalError(_)
            | PaymentError::AnyhowError(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let error_code = self.error_code();

        let status = match &self {
            PaymentError::MissingField(_)
            | PaymentError::InvalidAmount(_)
            | PaymentError::UnsupportedPair(_)
            | PaymentError::MalformedDeeplink(_)
            | PaymentError::InvalidTxHash(_) => StatusCode::BAD_REQUEST,
            PaymentError::InvalidSignature | PaymentError::Expired => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PaymentError::RecipientMismatch { .. }
            | PaymentError::AmountMismatch { .. }
            | PaymentError::TransactionFailed => StatusCode::CONFLICT,
            PaymentError::TransientLookupFailure(_) | PaymentError::RpcError(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: error_code.to_string(),
            timestamp: Utc::now(),
            request_id,
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, error_code = error_code, "Request failed");
        } else {
            tracing::warn!(error = %self, error_code = error_code, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}
