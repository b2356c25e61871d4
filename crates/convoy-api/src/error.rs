//! API error type and its JSON rendering.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use convoy_state::StateError;

use crate::manifest::ManifestError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    State(#[from] StateError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::ServiceNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Manifest(_) => StatusCode::BAD_REQUEST,
            ApiError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (
            status,
            Json(serde_json::json!({
                "success": false,
                "error": self.to_string(),
            })),
        )
            .into_response()
    }
}
