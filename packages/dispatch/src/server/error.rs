//! Maps engine errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::common::DispatchError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl DispatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
            DispatchError::InvalidTransition { .. } | DispatchError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            DispatchError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            DispatchError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DispatchError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, kind = self.kind(), "Request rejected");
        }

        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
