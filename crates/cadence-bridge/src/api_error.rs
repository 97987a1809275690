//! HTTP surface for [`cadence_core::error::CoreError`]: the single place
//! `ErrorKind` is mapped to a status code and JSON body, per §7's taxonomy.

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use cadence_core::error::{CoreError, ErrorKind};
use serde_json::json;

/// Wraps [`CoreError`] so it can implement `IntoResponse` without this
/// crate owning the error type itself.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = match err.kind() {
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::BAD_REQUEST,
            ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
            ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Deadline => StatusCode::GATEWAY_TIMEOUT,
        };

        let mut body = json!({ "error": err.to_string() });
        if let CoreError::Validation(field_errors) = &err {
            body["field_errors"] = json!(field_errors);
        }
        if let CoreError::RateLimit { retry_after_secs } = &err {
            body["retry_after_secs"] = json!(retry_after_secs);
        }

        let mut response = (status, Json(body)).into_response();
        if let CoreError::RateLimit { retry_after_secs } = &err {
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                headers.insert("retry-after", value);
            }
            headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_found_maps_to_404() {
        let response = ApiError(CoreError::not_found("project")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn auth_error_maps_to_401() {
        let response = ApiError(CoreError::Auth("missing token".into())).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rate_limit_includes_retry_after_in_body() {
        let response = ApiError(CoreError::RateLimit { retry_after_secs: 42 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["retry_after_secs"], 42);
    }

    #[tokio::test]
    async fn validation_error_includes_field_errors() {
        let response = ApiError(CoreError::validation("email", "invalid format")).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["field_errors"][0]["field"], "email");
    }
}
