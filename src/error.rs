use crate::types::AppointmentStatus;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{entity} {id} does not exist")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Designer is not available at the selected time")]
    Conflict,

    #[error("Appointment can't change status from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Date {0} is outside the supported calendar range")]
    OutOfRange(DateTime<Utc>),

    #[error("A user with email {0} already exists")]
    DuplicateUser(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Store lock was poisoned")]
    Poisoned,

    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),
}

impl BackendError {
    pub fn appointment_not_found(id: Uuid) -> Self {
        BackendError::NotFound {
            entity: "Appointment",
            id,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for BackendError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        BackendError::Poisoned
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Access denied")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("Server error")]
    Internal,
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound { entity, .. } => ApiError::NotFound(format!("{entity} not found")),
            BackendError::Conflict
            | BackendError::InvalidTransition { .. }
            | BackendError::OutOfRange(_)
            | BackendError::DuplicateUser(_) => ApiError::BadRequest(err.to_string()),
            BackendError::Database(_) | BackendError::Poisoned | BackendError::Corrupt(_) => {
                error!(?err, "Backend failure");
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = json!({
            "success": false,
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
