use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orderchat_shared::ChatError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ChatError> for ServerError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Validation { field, message } => ServerError::Validation { field, message },
            ChatError::Unauthenticated => ServerError::Unauthorized(err.to_string()),
            ChatError::Forbidden(msg) => ServerError::Forbidden(msg),
            ChatError::NotFound(what) => ServerError::NotFound(what),
            ChatError::RateLimited => ServerError::TooManyRequests,
            ChatError::RoomClosed => ServerError::Conflict(err.to_string()),
            ChatError::Internal(detail) => ServerError::Internal(detail),
        }
    }
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::Validation { .. } | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            ServerError::Validation { field, message } => serde_json::json!({
                "success": false,
                "message": "Validation failed",
                "errors": [{ "field": field, "message": message }],
            }),
            ServerError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                serde_json::json!({
                    "success": false,
                    "message": "Internal server error",
                })
            }
            other => serde_json::json!({
                "success": false,
                "message": other.to_string(),
            }),
        };

        (status, axum::Json(body)).into_response()
    }
}
