use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use thiserror::Error;

use crate::aggregator::AggregationError;
use crate::composer::ComposeError;
use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Policy rejections: the request is well formed but may not be served as is.
    #[error("unprocessable: {0}")]
    Unprocessable(String),

    #[error("internal error")]
    Internal,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()),
        };

        (status, Json(ErrorBody { error: msg })).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let msg = e.to_string();
        match e {
            LedgerError::Unauthorized | LedgerError::NotOwner => ApiError::Forbidden(msg),
            LedgerError::NotFound => ApiError::NotFound(msg),
            LedgerError::Paused
            | LedgerError::NotPaused
            | LedgerError::DuplicateCredential
            | LedgerError::ProofReplayed
            | LedgerError::AlreadyRevoked => ApiError::Conflict(msg),
            LedgerError::ExpiredCredential
            | LedgerError::SubjectMismatch
            | LedgerError::ProofRejected(_)
            | LedgerError::EmptyStoragePointer => ApiError::BadRequest(msg),
        }
    }
}

impl From<AggregationError> for ApiError {
    fn from(e: AggregationError) -> Self {
        match e {
            AggregationError::Dp(_) => ApiError::BadRequest(e.to_string()),
            _ => ApiError::Unprocessable(e.to_string()),
        }
    }
}

impl From<ComposeError> for ApiError {
    fn from(e: ComposeError) -> Self {
        match e {
            ComposeError::ConstraintViolation(_) | ComposeError::Witness(_) => ApiError::Unprocessable(e.to_string()),
            ComposeError::InvalidClaim(_) => ApiError::BadRequest(e.to_string()),
            ComposeError::SubjectNotAuthorized => ApiError::Forbidden(e.to_string()),
            ComposeError::MissingProvingKey(_) => ApiError::NotFound(e.to_string()),
            ComposeError::Proving(_) => ApiError::Internal,
        }
    }
}

impl From<privacy_engine::KAnonymityError> for ApiError {
    fn from(e: privacy_engine::KAnonymityError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}
