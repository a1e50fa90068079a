use crate::domain::{ConversionStatus, Decimal};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors returned synchronously by the ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("no commission tier qualifies for total_sales={0}")]
    NoTierFound(i64),
    #[error("shares {distributed} exceed commission total {commission_total}")]
    DistributionExceeded {
        commission_total: Decimal,
        distributed: Decimal,
    },
    #[error("cannot {action} a {from} conversion")]
    InvalidStatus {
        from: ConversionStatus,
        action: &'static str,
    },
    #[error("insufficient cashback balance: {balance} available, {requested} requested")]
    InsufficientBalance {
        balance: Decimal,
        requested: Decimal,
    },
    #[error("order {order_ref} already recorded for this program")]
    DuplicateOrder { order_ref: String },
    #[error("payout batch contains no conversions")]
    EmptyBatch,
    #[error("invalid amount {amount}")]
    InvalidAmount { amount: Decimal },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl LedgerError {
    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        LedgerError::NotFound(format!("{} {}", what, id))
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(_) => AppError::NotFound(err.to_string()),
            LedgerError::DistributionExceeded { .. }
            | LedgerError::InsufficientBalance { .. }
            | LedgerError::EmptyBatch
            | LedgerError::InvalidAmount { .. } => AppError::BadRequest(err.to_string()),
            LedgerError::InvalidStatus { .. } | LedgerError::DuplicateOrder { .. } => {
                AppError::Conflict(err.to_string())
            }
            LedgerError::NoTierFound(_) | LedgerError::Db(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
