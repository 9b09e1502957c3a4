//! API Error Handling
//!
//! Maps engine errors to HTTP status codes and a JSON body that carries the
//! request id.

use crate::errors::CrashError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error envelope; `success` is always false
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// BAD_REQUEST, NOT_FOUND, CONFLICT, ...
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    InternalError(String),
}

impl ApiError {
    fn new(kind: ApiErrorKind, request_id: String) -> Self {
        Self {
            kind,
            request_id,
            details: None,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self::new(ApiErrorKind::BadRequest(message), request_id)
    }

    pub fn unauthorized(request_id: String, message: String) -> Self {
        Self::new(ApiErrorKind::Unauthorized(message), request_id)
    }

    pub fn not_found(request_id: String, message: String) -> Self {
        Self::new(ApiErrorKind::NotFound(message), request_id)
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self::new(ApiErrorKind::InternalError(message), request_id)
    }

    /// Translate an engine error for the caller identified by `request_id`
    pub fn from_crash(request_id: String, err: CrashError) -> Self {
        match err {
            CrashError::Validation(msg) => Self::bad_request(request_id, msg),
            CrashError::InsufficientBalance {
                required,
                available,
            } => Self {
                kind: ApiErrorKind::BadRequest("Insufficient wallet balance".to_string()),
                request_id,
                details: Some(serde_json::json!({
                    "required": required,
                    "available": available,
                })),
            },
            CrashError::NotFound(msg) => Self::not_found(request_id, msg),
            CrashError::Forbidden(msg) => Self::new(ApiErrorKind::Forbidden(msg), request_id),
            CrashError::AlreadyCompleted(game_id) => Self::new(
                ApiErrorKind::Conflict(format!("Game {} is already completed", game_id)),
                request_id,
            ),
            // Storage details stay in the logs
            CrashError::Storage(e) => {
                tracing::error!("[{}] storage failure: {}", request_id, e);
                Self::internal_error(request_id, "Storage failure".to_string())
            }
            CrashError::Configuration(e) => Self::internal_error(request_id, e.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match &self.kind {
            ApiErrorKind::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiErrorKind::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiErrorKind::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiErrorKind::NotFound(_) => StatusCode::NOT_FOUND,
            ApiErrorKind::Conflict(_) => StatusCode::CONFLICT,
            ApiErrorKind::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code_and_message(&self) -> (&'static str, &str) {
        match &self.kind {
            ApiErrorKind::BadRequest(msg) => ("BAD_REQUEST", msg),
            ApiErrorKind::Unauthorized(msg) => ("UNAUTHORIZED", msg),
            ApiErrorKind::Forbidden(msg) => ("FORBIDDEN", msg),
            ApiErrorKind::NotFound(msg) => ("NOT_FOUND", msg),
            ApiErrorKind::Conflict(msg) => ("CONFLICT", msg),
            ApiErrorKind::InternalError(msg) => ("INTERNAL_ERROR", msg),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (code, message) = self.code_and_message();
        write!(f, "[{}] {}: {}", self.request_id, code, message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = self.code_and_message();

        let body = Json(ErrorResponse {
            success: false,
            message: message.to_string(),
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
                details: self.details.clone(),
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_map_to_status_codes() {
        let cases = [
            (CrashError::validation("bad bet"), StatusCode::BAD_REQUEST),
            (
                CrashError::InsufficientBalance {
                    required: 10.0,
                    available: 5.0,
                },
                StatusCode::BAD_REQUEST,
            ),
            (CrashError::not_found("no game"), StatusCode::NOT_FOUND),
            (CrashError::forbidden("not yours"), StatusCode::FORBIDDEN),
            (CrashError::AlreadyCompleted(7), StatusCode::CONFLICT),
            (
                CrashError::Storage(crate::errors::StorageError::LockPoisoned),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from_crash("req-1".to_string(), err).status(), expected);
        }
    }

    #[test]
    fn test_insufficient_balance_carries_details() {
        let err = ApiError::from_crash(
            "req-2".to_string(),
            CrashError::InsufficientBalance {
                required: 1000.0,
                available: 250.0,
            },
        );
        let details = err.details.unwrap();
        assert_eq!(details["available"], 250.0);
    }
}
