use crate::api::tus::{TUS_RESUMABLE, TUS_VERSION, UPLOAD_OFFSET};
use crate::services::upload_service::UploadError;
use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Non-standard status the TUS checksum extension uses for digest mismatches.
const CHECKSUM_MISMATCH: u16 = 460;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {message}")]
    Conflict { message: String, offset: u64 },

    #[error("Payload Too Large: {message}")]
    PayloadTooLarge { message: String, offset: Option<u64> },

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Locked: {0}")]
    Locked(String),

    #[error("Precondition Failed: {0}")]
    PreconditionFailed(String),

    #[error("Unsupported Media Type: {0}")]
    UnsupportedMediaType(String),

    #[error("Checksum Mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("Service Unavailable: {message}")]
    ServiceUnavailable { message: String, offset: Option<u64> },

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        let message = err.to_string();
        let offset = err.offset();
        match err {
            UploadError::Validation(msg) => AppError::BadRequest(msg),
            UploadError::NotFound(_) => AppError::NotFound(message),
            UploadError::Conflict { current, .. } => AppError::Conflict {
                message,
                offset: current,
            },
            UploadError::Oversize { .. } => AppError::PayloadTooLarge { message, offset },
            UploadError::TerminalState { .. } => AppError::Gone(message),
            UploadError::Locked(_) => AppError::Locked(message),
            UploadError::ChecksumMismatch => AppError::ChecksumMismatch(message),
            UploadError::Storage { .. } => AppError::ServiceUnavailable { message, offset },
            UploadError::Registry(e) => AppError::Database(e),
            UploadError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(TUS_RESUMABLE, HeaderValue::from_static(TUS_VERSION));

        let mut offset_header = |offset: u64| {
            headers.insert(UPLOAD_OFFSET, HeaderValue::from(offset));
        };

        let (status, message) = match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict { message, offset } => {
                offset_header(offset);
                (StatusCode::CONFLICT, message)
            }
            AppError::PayloadTooLarge { message, offset } => {
                if let Some(offset) = offset {
                    offset_header(offset);
                }
                (StatusCode::PAYLOAD_TOO_LARGE, message)
            }
            AppError::Gone(msg) => (StatusCode::GONE, msg),
            AppError::Locked(msg) => (StatusCode::LOCKED, msg),
            AppError::PreconditionFailed(msg) => (StatusCode::PRECONDITION_FAILED, msg),
            AppError::UnsupportedMediaType(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg),
            AppError::ChecksumMismatch(msg) => (
                StatusCode::from_u16(CHECKSUM_MISMATCH).unwrap_or(StatusCode::BAD_REQUEST),
                msg,
            ),
            AppError::ServiceUnavailable { message, offset } => {
                tracing::warn!("Transient storage failure: {}", message);
                if let Some(offset) = offset {
                    offset_header(offset);
                }
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage temporarily unavailable, retry from Upload-Offset".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Anyhow(e) => {
                tracing::error!("Anyhow error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, headers, body).into_response()
    }
}
