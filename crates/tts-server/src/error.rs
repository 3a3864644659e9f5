//! Mapping of service errors to HTTP responses.
//!
//! Every error body is `{"detail": "<message>"}`.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;
use tts_core::TtsError;

/// An error ready to be sent to the client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

impl ApiError {
    /// Create an error with an explicit status.
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    /// HTTP status of the response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Message sent as `detail`.
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// HTTP status for a service error.
pub fn status_for(err: &TtsError) -> StatusCode {
    match err {
        TtsError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        TtsError::NotFound(_) => StatusCode::NOT_FOUND,
        TtsError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TtsError::Synthesis(_)
        | TtsError::Subprocess(_)
        | TtsError::ModelLoad { .. }
        | TtsError::Config(_)
        | TtsError::Io(_)
        | TtsError::Serialization(_)
        | TtsError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<TtsError> for ApiError {
    fn from(err: TtsError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!(kind = err.kind(), "Request failed: {err}");
        }
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: &self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}
