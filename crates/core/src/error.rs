//! Error types for Cadence core domain logic

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::types::{AppointmentId, RuleId};

/// A single rejected field in an ingress payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Field-level validation failures collected from one payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self(vec![FieldError::new(field, message)])
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }

    /// Returns `Ok(value)` when nothing was collected
    pub fn into_result<T>(self, value: T) -> Result<T, SchedulingError> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(SchedulingError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", err.field, err.message)?;
        }
        Ok(())
    }
}

/// Failures reported by a store collaborator
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport-level failure; callers may retry
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Record not found")]
    NotFound,

    #[error("Access to the requested scope was denied")]
    Forbidden,

    #[error("Malformed record: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether a caller can safely retry the same call later
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    StoreError::UniqueViolation(
                        db_err.constraint().unwrap_or("unknown").to_string(),
                    )
                } else if db_err.code().as_deref() == Some("42501") {
                    // insufficient_privilege, raised by row-level security
                    StoreError::Forbidden
                } else {
                    StoreError::Unavailable(db_err.to_string())
                }
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Decode(err.to_string())
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

/// Core scheduling domain errors
#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Recurring rule not found: {0}")]
    RuleNotFound(RuleId),

    #[error("Appointment not found: {0}")]
    AppointmentNotFound(AppointmentId),

    #[error("Permission denied")]
    PermissionDenied,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SchedulingError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        SchedulingError::Validation(ValidationErrors::single(field, message))
    }
}

/// Result type alias for scheduling operations
pub type SchedulingResult<T> = Result<T, SchedulingError>;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}
