//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use hireflow_core::{CvId, LedgerError, TransactionId};
use hireflow_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Insufficient credits.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// Credits were taken but CVs were not unlocked.
    #[error("unlock paid by transaction {transaction_id} but not applied")]
    InconsistentState {
        /// The deduction that was committed.
        transaction_id: TransactionId,
        /// CVs that should have been unlocked.
        cv_ids: Vec<CvId>,
    },

    /// The ledger stayed contended for every retry.
    #[error("ledger busy, retry later")]
    Busy,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::InsufficientCredits { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                self.to_string(),
                Some(serde_json::json!({
                    "balance": balance,
                    "required": required
                })),
            ),
            Self::InconsistentState {
                transaction_id,
                cv_ids,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "inconsistent_state",
                "Credits were deducted but the CVs could not be unlocked; support has been alerted"
                    .to_string(),
                Some(serde_json::json!({
                    "transaction_id": transaction_id,
                    "cv_ids": cv_ids
                })),
            ),
            Self::Busy => (
                StatusCode::SERVICE_UNAVAILABLE,
                "ledger_busy",
                self.to_string(),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientCredits { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            LedgerError::InvalidAmount(msg) | LedgerError::MalformedEvent(msg) => {
                Self::BadRequest(msg)
            }
            LedgerError::InvalidId(e) => Self::BadRequest(e.to_string()),
            LedgerError::NotFound { entity, id } => {
                Self::NotFound(format!("{entity} not found: {id}"))
            }
            LedgerError::InconsistentState {
                transaction_id,
                cv_ids,
                ..
            } => Self::InconsistentState {
                transaction_id,
                cv_ids,
            },
            LedgerError::Contention { .. } => Self::Busy,
            LedgerError::Storage(msg) => Self::Internal(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        LedgerError::from(err).into()
    }
}
