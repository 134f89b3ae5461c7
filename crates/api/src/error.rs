//! Error handling for API endpoints

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cadence_core::error::{FieldError, SchedulingError, StoreError, ValidationErrors};
use serde::Serialize;

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

/// API error type that can be converted to HTTP responses
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Validation(ValidationErrors),
    Unauthorized(String),
    Forbidden,
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut fields = Vec::new();
        let (status, error, details) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not Found", Some(msg)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad Request", Some(msg)),
            ApiError::Validation(errors) => {
                let summary = errors.to_string();
                fields = errors.fields().to_vec();
                (StatusCode::BAD_REQUEST, "Validation Failed", Some(summary))
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "Unauthorized", Some(msg)),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden", None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", Some(msg)),
            ApiError::Unavailable(msg) => {
                tracing::warn!("Store unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service Unavailable",
                    None,
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            details,
            fields,
        });

        (status, body).into_response()
    }
}

/// Convert SchedulingError to ApiError
impl From<SchedulingError> for ApiError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::Validation(errors) => ApiError::Validation(errors),
            SchedulingError::RuleNotFound(id) => {
                ApiError::NotFound(format!("Recurring rule not found: {}", id))
            }
            SchedulingError::AppointmentNotFound(id) => {
                ApiError::NotFound(format!("Appointment not found: {}", id))
            }
            SchedulingError::PermissionDenied => ApiError::Forbidden,
            SchedulingError::Store(e) => e.into(),
        }
    }
}

/// Convert store errors to ApiError
impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => ApiError::Unavailable(msg),
            StoreError::UniqueViolation(constraint) => {
                ApiError::Conflict(format!("Constraint violation: {}", constraint))
            }
            StoreError::NotFound => ApiError::NotFound("Resource not found".to_string()),
            StoreError::Forbidden => ApiError::Forbidden,
            StoreError::Decode(msg) => ApiError::Internal(format!("Database error: {}", msg)),
        }
    }
}
