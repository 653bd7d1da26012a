//! Mapping of service errors onto HTTP responses.
//!
//! Authentication and decode failures share one generic body so a caller
//! cannot tell which check rejected its payload. Details go to the log only.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;

use crate::crypto::CryptoError;
use crate::service::ServiceError;

pub(super) type ApiError = (StatusCode, String);

pub(super) const OPEN_FAILED: &str = "could not open secure data";

pub(super) fn service_error(err: ServiceError) -> ApiError {
    match err {
        ServiceError::Crypto(CryptoError::InvalidInput(msg)) => {
            (StatusCode::BAD_REQUEST, format!("Invalid input: {}", msg))
        }
        ServiceError::Crypto(CryptoError::AuthenticationFailure(reason)) => {
            tracing::warn!(reason = %reason, "Rejected secure payload");
            (StatusCode::BAD_REQUEST, OPEN_FAILED.to_string())
        }
        ServiceError::Crypto(CryptoError::DecodeError(msg)) => {
            tracing::warn!("Rejected secure payload: {}", msg);
            (StatusCode::BAD_REQUEST, OPEN_FAILED.to_string())
        }
        ServiceError::Crypto(CryptoError::PreconditionFailed(msg)) => {
            (StatusCode::PRECONDITION_FAILED, msg)
        }
        ServiceError::AccountNotFound(_) => {
            (StatusCode::NOT_FOUND, "account not found".to_string())
        }
        ServiceError::DuplicateAccount(_) => {
            (StatusCode::CONFLICT, "account already exists".to_string())
        }
        err @ ServiceError::Conflict { .. } => (StatusCode::CONFLICT, err.to_string()),
        ServiceError::StorageUnavailable(msg) => {
            tracing::error!("Storage unavailable: {}", msg);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "storage unavailable".to_string(),
            )
        }
    }
}

pub(super) fn crypto_error(err: CryptoError) -> ApiError {
    service_error(ServiceError::from(err))
}

/// Unwrap a JSON body, turning any extractor rejection into a 400.
pub(super) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        (
            StatusCode::BAD_REQUEST,
            format!("Invalid input: {}", rejection.body_text()),
        )
    })
}

pub(super) fn internal_error(context: &str, err: impl std::fmt::Display) -> ApiError {
    tracing::error!("{}: {}", context, err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal error".to_string(),
    )
}
