//! Conversion of execution failures into HTTP responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lence_core::{ErrorKind, ExecError};
use serde::Serialize;

/// An [`ExecError`] on its way out as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub ExecError);

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a str>,
}

impl ApiError {
    /// Request body or query string could not be decoded
    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self(ExecError::new(ErrorKind::BadRequest, detail))
    }

    pub fn status(&self) -> StatusCode {
        match self.0.kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::SourceUnavailable | ErrorKind::QueryFailed | ErrorKind::Timeout => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ExecError> for ApiError {
    fn from(err: ExecError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = Some(self.0.message.as_str()).filter(|m| !m.is_empty());
        let body = ErrorBody {
            error: self.0.kind.as_str(),
            detail,
        };
        (self.status(), Json(body)).into_response()
    }
}
