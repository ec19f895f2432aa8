//! HTTP Error Handling
//!
//! 错误统一返回 `{errno, error, reason?, data: null}`，errno 与 HTTP 状态码一致

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::application::{ApplicationError, StorageError};

/// 统一错误响应格式
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errno: i32,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    pub data: Option<()>,
}

impl ErrorResponse {
    pub fn new(errno: i32, error: impl Into<String>, reason: Option<&'static str>) -> Self {
        Self {
            errno,
            error: error.into(),
            reason,
            data: None,
        }
    }
}

/// API 错误
#[derive(Debug)]
pub enum ApiError {
    /// reason 为机器可读的原因码
    BadRequest {
        message: String,
        reason: &'static str,
    },
    Unauthorized(String),
    Forbidden {
        message: String,
        reason: &'static str,
    },
    NotFound(String),
    Conflict(String),
    Internal(String),
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>, reason: &'static str) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            reason,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let errno = status.as_u16() as i32;

        let response = match self {
            ApiError::BadRequest { message, reason } => {
                tracing::warn!(errno, reason, error = %message, "Bad request");
                ErrorResponse::new(errno, message, Some(reason))
            }
            ApiError::Unauthorized(message) => {
                tracing::warn!(errno, error = %message, "Unauthorized");
                ErrorResponse::new(errno, message, Some("unauthorized"))
            }
            ApiError::Forbidden { message, reason } => {
                tracing::warn!(errno, reason, error = %message, "Forbidden");
                ErrorResponse::new(errno, message, Some(reason))
            }
            ApiError::NotFound(message) => {
                tracing::warn!(errno, error = %message, "Resource not found");
                ErrorResponse::new(errno, message, Some("not_found"))
            }
            ApiError::Conflict(message) => {
                tracing::warn!(errno, error = %message, "Resource conflict");
                ErrorResponse::new(errno, message, Some("conflict"))
            }
            ApiError::Internal(message) => {
                tracing::error!(errno, error = %message, "Internal server error");
                ErrorResponse::new(errno, message, None)
            }
            ApiError::ServiceUnavailable(message) => {
                tracing::error!(errno, error = %message, "Service unavailable");
                ErrorResponse::new(errno, message, Some("service_unavailable"))
            }
        };

        (status, Json(response)).into_response()
    }
}

impl From<ApplicationError> for ApiError {
    fn from(e: ApplicationError) -> Self {
        match e {
            ApplicationError::NotFound { resource_type, id } => {
                ApiError::NotFound(format!("{} not found: {}", resource_type, id))
            }
            ApplicationError::Validation(err) => ApiError::bad_request(err.to_string(), err.reason()),
            ApplicationError::InvalidState(msg) => ApiError::Conflict(msg),
            ApplicationError::QueueUnavailable(msg) => ApiError::ServiceUnavailable(msg),
            ApplicationError::ExternalServiceError(msg) => ApiError::ServiceUnavailable(msg),
            ApplicationError::RepositoryError(msg)
            | ApplicationError::StorageError(msg)
            | ApplicationError::InternalError(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidSignature => ApiError::Forbidden {
                message: e.to_string(),
                reason: "invalid_signature",
            },
            StorageError::Expired => ApiError::Forbidden {
                message: e.to_string(),
                reason: "url_expired",
            },
            StorageError::NotFound(_) => ApiError::NotFound(e.to_string()),
            StorageError::InvalidKey(_) => ApiError::bad_request(e.to_string(), "invalid_key"),
            StorageError::IoError(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::bad_request(e.body_text(), "invalid_body")
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::bad_request(e.body_text(), "invalid_query")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::ValidationError;
    use http_body_util::BodyExt;

    async fn body_json(error: ApiError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_maps_to_400_with_reason() {
        let error: ApiError = ApplicationError::Validation(ValidationError::EmptyText).into();
        let (status, body) = body_json(error).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errno"], 400);
        assert_eq!(body["reason"], "empty_text");
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (ApplicationError::not_found("Job", "x").into(), StatusCode::NOT_FOUND),
            (ApplicationError::invalid_state("done").into(), StatusCode::CONFLICT),
            (
                ApplicationError::QueueUnavailable("down".into()).into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (StorageError::InvalidSignature.into(), StatusCode::FORBIDDEN),
            (StorageError::Expired.into(), StatusCode::FORBIDDEN),
            (
                StorageError::NotFound("k".into()).into(),
                StatusCode::NOT_FOUND,
            ),
        ];

        for (error, expected) in cases {
            let (status, body) = body_json(error).await;
            assert_eq!(status, expected);
            assert_eq!(body["errno"], expected.as_u16());
        }
    }

    #[tokio::test]
    async fn test_internal_error_has_no_reason() {
        let (_, body) = body_json(ApiError::Internal("boom".into())).await;
        assert!(body.get("reason").is_none());
        assert_eq!(body["error"], "boom");
    }
}
