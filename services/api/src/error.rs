//! Custom error types for the API service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Custom error type for the API service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or empty input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials
    #[error("Unauthorized")]
    Unauthenticated,

    /// Ownership or role check failed; `photo_ids` names the offending
    /// items for batch requests
    #[error("Forbidden: {message}")]
    Forbidden {
        message: String,
        photo_ids: Vec<Uuid>,
    },

    /// No matching records
    #[error("Not found: {0}")]
    NotFound(String),

    /// The blob store or metadata store failed
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Internal server error
    #[error("Internal server error")]
    InternalServerError,

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] common::error::DatabaseError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, json!({ "error": "Unauthorized" }))
            }
            ApiError::Forbidden { message, photo_ids } => {
                let body = if photo_ids.is_empty() {
                    json!({ "error": message })
                } else {
                    json!({ "error": message, "unauthorizedPhotoIds": photo_ids })
                };
                (StatusCode::FORBIDDEN, body)
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::Upstream(details) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Upstream failure", "details": details }),
            ),
            ApiError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal server error" }),
            ),
            ApiError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Database error" }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_variants_to_expected_status_codes() {
        let cases = [
            (
                ApiError::BadRequest("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (
                ApiError::Forbidden {
                    message: "no".to_string(),
                    photo_ids: vec![],
                },
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::NotFound("missing".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Upstream("blob store unavailable".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::InternalServerError,
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
