//! Ledger error types with HTTP status code mapping.
//!
//! [`LedgerError`] is the central error type for the ledger. Every business
//! rule violation has its own variant so callers can render an actionable
//! message. Each variant maps to a numeric code and an HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::LoanStatus;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 3004,
///     "message": "amount 1500 exceeds outstanding balance of 1000",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Ledger error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category       | HTTP Status                   |
/// |-----------|----------------|-------------------------------|
/// | 1000–1999 | Validation     | 400 Bad Request               |
/// | 2000–2999 | Lookup         | 404 Not Found                 |
/// | 3000–3999 | Loan state     | 409 Conflict / 422            |
/// | 4000–4999 | Access         | 401 / 403                     |
/// | 5000–5999 | Infrastructure | 500 / 503                     |
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Amount is non-positive, has too many decimals, or is otherwise unusable.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Loan with the given reference does not exist.
    #[error("loan not found: {0}")]
    NotFound(String),

    /// The worker directory has no worker with this id.
    #[error("worker not found: {0}")]
    WorkerNotFound(uuid::Uuid),

    /// The loan has already been paid off.
    #[error("loan {0} is already settled")]
    AlreadySettled(String),

    /// The loan has been cancelled.
    #[error("loan {0} is cancelled")]
    LoanCancelled(String),

    /// Illegal status change or edit on a terminal loan.
    #[error("cannot {action} a loan in status {from}")]
    InvalidTransition {
        /// Status the loan was in.
        from: LoanStatus,
        /// Attempted action.
        action: &'static str,
    },

    /// Payment would drive the balance below zero.
    #[error("amount {amount} exceeds outstanding balance of {balance}")]
    OverPayment {
        /// Requested payment amount.
        amount: Decimal,
        /// Outstanding balance at the time of the check.
        balance: Decimal,
    },

    /// Concurrent writers collided and the bounded retry was exhausted.
    #[error("concurrent update conflict: {0}")]
    ConcurrencyConflict(String),

    /// No usable actor identity on the request.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Actor lacks the capability for this operation.
    #[error("forbidden: actor may not {0}")]
    Forbidden(&'static str),

    /// Sequence counter could not be incremented.
    #[error("sequence allocation failed: {0}")]
    AllocationFailed(String),

    /// Audit sink did not accept the entry.
    #[error("audit delivery failed: {0}")]
    AuditDelivery(String),

    /// Storage connectivity failure. Safe to retry.
    #[error("storage unavailable: {0}")]
    Storage(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidAmount(_) => 1001,
            Self::InvalidRequest(_) => 1002,
            Self::NotFound(_) => 2001,
            Self::WorkerNotFound(_) => 2002,
            Self::AlreadySettled(_) => 3001,
            Self::LoanCancelled(_) => 3002,
            Self::InvalidTransition { .. } => 3003,
            Self::OverPayment { .. } => 3004,
            Self::ConcurrencyConflict(_) => 3005,
            Self::Unauthenticated(_) => 4001,
            Self::Forbidden(_) => 4003,
            Self::AllocationFailed(_) => 5001,
            Self::AuditDelivery(_) => 5002,
            Self::Storage(_) => 5003,
            Self::Internal(_) => 5000,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidAmount(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) | Self::WorkerNotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadySettled(_)
            | Self::LoanCancelled(_)
            | Self::InvalidTransition { .. }
            | Self::ConcurrencyConflict(_) => StatusCode::CONFLICT,
            Self::OverPayment { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::AllocationFailed(_) | Self::AuditDelivery(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns `true` if the payment recorder may retry the operation itself.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict(_))
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
