//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use stage::StageError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Upload stage error.
    Stage(StageError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Stage(err) => stage_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn stage_error_to_response(err: StageError) -> (StatusCode, String) {
    match &err {
        StageError::CredentialInvalid(_) | StageError::CredentialExpired(_) => {
            (StatusCode::FORBIDDEN, err.to_string())
        }
        StageError::AlreadyExists(_) => (StatusCode::CONFLICT, err.to_string()),
        StageError::ObjectNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        StageError::Backend(_) => {
            tracing::error!(error = %err, "stage backend error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<StageError> for ApiError {
    fn from(err: StageError) -> Self {
        ApiError::Stage(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_stage_errors_map_to_http_status() {
        let key = "abc".to_string();
        assert_eq!(
            status_of(StageError::CredentialInvalid(key.clone()).into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(StageError::CredentialExpired(key.clone()).into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(StageError::AlreadyExists(key.clone()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(StageError::ObjectNotFound(key).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(StageError::Backend("disk full".to_string()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_request_errors() {
        assert_eq!(
            status_of(ApiError::NotFound("Unknown bucket: x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ApiError::BadRequest("Missing upload token".to_string())),
            StatusCode::BAD_REQUEST
        );
    }
}
