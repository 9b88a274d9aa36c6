use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;
use tracing::error;

use crate::domain::{CoreError, DenyReason, ErrorKind};

/// Canonical JSON payload for error responses.
#[derive(Debug, Serialize, Clone)]
pub struct ApiError {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    pub message: String,
}

/// Plain acknowledgement body.
#[derive(Debug, Serialize, Clone)]
pub struct ApiMessage {
    pub message: String,
}

impl ApiMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type ErrorResponse = (StatusCode, Json<ApiError>);
pub type ApiResult<T> = Result<Json<T>, ErrorResponse>;

/// Helper for controllers that need to return `(StatusCode, Json<ApiError>)`
/// without going through the domain layer.
pub fn json_error(
    status: StatusCode,
    kind: ErrorKind,
    message: impl Into<String>,
) -> ErrorResponse {
    (
        status,
        Json(ApiError {
            kind,
            reason: None,
            message: message.into(),
        }),
    )
}

pub fn status_for(err: &CoreError) -> StatusCode {
    match err.kind() {
        ErrorKind::DuplicateKey | ErrorKind::Conflict | ErrorKind::InvalidTransition => {
            StatusCode::CONFLICT
        }
        ErrorKind::InvalidReference | ErrorKind::OutOfRange | ErrorKind::UnsupportedType => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::InvalidCredentials => StatusCode::UNAUTHORIZED,
        ErrorKind::EmailNotVerified => StatusCode::FORBIDDEN,
        ErrorKind::InvalidToken | ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Forbidden => match err.deny_reason() {
            Some(DenyReason::NotAuthenticated) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::FORBIDDEN,
        },
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub fn core_error(err: CoreError) -> ErrorResponse {
    let status = status_for(&err);
    if status == StatusCode::SERVICE_UNAVAILABLE {
        error!(?err, "request failed on an unavailable dependency");
    }
    let message = match &err {
        // Store details stay in the log.
        CoreError::Unavailable(_) => "Service temporarily unavailable. Please retry.".to_string(),
        other => other.to_string(),
    };
    (
        status,
        Json(ApiError {
            kind: err.kind(),
            reason: err.deny_reason(),
            message,
        }),
    )
}
