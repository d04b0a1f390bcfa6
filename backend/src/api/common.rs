use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::core::DbError;

/// Standard error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
    /// Machine-readable error type code
    pub error_type: String,
}

/// Handler error rendered as `(status, ErrorResponse)`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, error_type: &str, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.into(),
                error_type: error_type.to_string(),
            },
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", error)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Not authenticated")
    }

    pub fn forbidden(error: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", error)
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", format!("{} not found", what))
    }

    pub fn conflict(error: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", error)
    }

    pub fn internal(error: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", error)
    }

    pub fn unavailable(error: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match &err {
            DbError::Application { code, message } => {
                if err.is_unique_violation() {
                    tracing::warn!(code = %code, "Unique violation: {}", message);
                    ApiError::conflict("Resource already exists")
                } else if err.is_foreign_key_violation() {
                    tracing::warn!(code = %code, "Foreign key violation: {}", message);
                    ApiError::new(
                        StatusCode::BAD_REQUEST,
                        "INVALID_REFERENCE",
                        "Referenced resource does not exist",
                    )
                } else if code.starts_with("22") || code.starts_with("23") {
                    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message.clone())
                } else {
                    tracing::error!(code = %code, "Application error: {}", message);
                    ApiError::internal("Internal server error")
                }
            }
            DbError::Connection(_)
            | DbError::Timeout(_)
            | DbError::PoolTimeout(_)
            | DbError::PoolClosed
            | DbError::TransactionTimeout(_) => {
                tracing::error!(error = %err, "Database unavailable");
                ApiError::unavailable("Database temporarily unavailable")
            }
            DbError::Driver { .. } | DbError::Decode(_) => {
                tracing::error!(error = %err, "Database error");
                ApiError::internal("Internal server error")
            }
        }
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;
