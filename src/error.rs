/// Unified error types for the Panneaux server
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for request handling
#[derive(Error, Debug)]
pub enum ApiError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Missing, invalid or expired session
    #[error("{0}")]
    Authentication(String),

    /// Caller lacks the role or ownership required
    #[error("{0}")]
    Authorization(String),

    /// Malformed or missing input, duplicate natural keys
    #[error("{0}")]
    Validation(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Not found errors
    #[error("{0}")]
    NotFound(String),

    /// Conflict errors (resource already exists)
    #[error("{0}")]
    Conflict(String),

    /// Media host errors (upload refused, timeout, transport)
    #[error("Media storage error: {0}")]
    Media(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),
}

impl ApiError {
    /// Translate a unique-constraint violation into a validation error
    /// carrying `message`; every other database error is passed through.
    pub fn duplicate_or(err: sqlx::Error, message: &str) -> Self {
        let unique = err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        if unique {
            ApiError::Validation(message.to_string())
        } else {
            ApiError::Database(err)
        }
    }

    /// Translate a foreign-key violation (the row is still referenced)
    /// into a conflict carrying `message`
    pub fn referenced_or(err: sqlx::Error, message: &str) -> Self {
        let referenced = err
            .as_database_error()
            .map(|db| db.is_foreign_key_violation())
            .unwrap_or(false);
        if referenced {
            ApiError::Conflict(message.to_string())
        } else {
            ApiError::Database(err)
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

/// Convert ApiError to HTTP response
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::Authentication(_) | ApiError::Jwt(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            ApiError::Authorization(_) => (StatusCode::FORBIDDEN, "Forbidden", self.to_string()),
            ApiError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            ApiError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                "Rate limit exceeded".to_string(),
            ),
            ApiError::Database(_)
            | ApiError::Internal(_)
            | ApiError::Io(_)
            | ApiError::Media(_) => {
                tracing::error!("Request failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalServerError",
                    "Internal server error".to_string(), // Don't leak details
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            error: error_code.to_string(),
            message,
        });

        let mut response = (status, body).into_response();
        if let ApiError::RateLimitExceeded { retry_after } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Result type alias for handler and manager operations
pub type ApiResult<T> = Result<T, ApiError>;
