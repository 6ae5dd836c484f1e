//! server::error
//!
//! HTTP-facing error type.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::audit::AuditError;
use crate::service::ServiceError;

/// Errors that escape a handler as a non-200 response.
///
/// Rendered as `{"success": false, "error": "<message>"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request (bad JSON, bad query, invalid path)
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Read failures and other unexpected errors
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidRequest(message) => ApiError::BadRequest(message),
            ServiceError::Runner(e) => ApiError::Internal(format!("git operation failed: {}", e.detail())),
            other @ ServiceError::NoRepository => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(format!("invalid query: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(json!({ "success": false, "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::GitRunnerError;

    #[test]
    fn service_errors_map_to_status_codes() {
        let bad: ApiError = ServiceError::InvalidRequest("path escapes repository".into()).into();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let runner: ApiError = ServiceError::Runner(GitRunnerError::Failed {
            command: "git status".into(),
            status: "exit status: 128".into(),
            stderr: "fatal: not a git repository".into(),
            stdout: String::new(),
        })
        .into();
        assert_eq!(runner.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(runner.to_string().contains("not a git repository"));

        let missing: ApiError = ServiceError::NoRepository.into();
        assert_eq!(missing.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn renders_json_body() {
        let response = ApiError::NotFound("no route".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
