// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tokenlens_core::llm::LlmError;
use tokenlens_core::nlsql::TranslationError;
use tokenlens_db::{DbError, ExecutionError};

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes.
///
/// Translation failures (including safety-gate rejections) are presented as
/// "could not understand"; the rejected SQL is logged for operators, never
/// returned. Execution failures are presented as "query failed" likewise.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Translation failed: {0}")]
    Translation(#[from] TranslationError),

    #[error("Execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
            ApiError::Conflict(msg) => {
                tracing::warn!(message = %msg, "Conflict");
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::with_details("Conflict", msg.clone()),
                )
            }
            ApiError::Translation(translation_err) => {
                let status = match translation_err {
                    // Provider outages are a gateway problem, not a
                    // question problem.
                    TranslationError::Provider(LlmError::Timeout(_))
                    | TranslationError::Provider(LlmError::Http(_))
                    | TranslationError::Provider(LlmError::NotAvailable(_)) => {
                        tracing::error!(error = %translation_err, "completion service unavailable");
                        StatusCode::BAD_GATEWAY
                    }
                    _ => {
                        tracing::warn!(error = %translation_err, "question could not be translated");
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                };
                let message = if status == StatusCode::BAD_GATEWAY {
                    "Completion service unavailable"
                } else {
                    "Could not understand the question"
                };
                (status, ErrorResponse::new(message))
            }
            ApiError::Execution(exec_err) => {
                tracing::error!(error = %exec_err, "query execution failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Query execution failed"),
                )
            }
            ApiError::Database(db_err) => {
                tracing::error!(error = %db_err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Database error", db_err.to_string()),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use tokenlens_core::nlsql::SqlGateError;

    async fn extract_response(response: Response) -> (StatusCode, ErrorResponse) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error_response: ErrorResponse = serde_json::from_slice(&body).unwrap();
        (status, error_response)
    }

    #[tokio::test]
    async fn test_translation_rejection_is_generic_422() {
        let error = ApiError::Translation(TranslationError::Rejected(
            SqlGateError::ForbiddenKeyword("drop".into()),
        ));
        let (status, body) = extract_response(error.into_response()).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.error, "Could not understand the question");
        // The rejected SQL and the rejection reason never reach the client
        assert!(body.details.is_none());
    }

    #[tokio::test]
    async fn test_no_sql_is_422() {
        let error = ApiError::Translation(TranslationError::NoSql);
        let (status, body) = extract_response(error.into_response()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.error, "Could not understand the question");
    }

    #[tokio::test]
    async fn test_provider_timeout_is_502() {
        let error = ApiError::Translation(TranslationError::Provider(LlmError::Timeout(60)));
        let (status, body) = extract_response(error.into_response()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.error, "Completion service unavailable");
    }

    #[tokio::test]
    async fn test_execution_failure_hides_detail() {
        let error = ApiError::Execution(ExecutionError::Sql {
            message: "no such column: usage".into(),
        });
        let (status, body) = extract_response(error.into_response()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Query execution failed");
        assert!(body.details.is_none());
    }

    #[tokio::test]
    async fn test_conflict_returns_409() {
        let error = ApiError::Conflict("aggregation already running".into());
        let (status, body) = extract_response(error.into_response()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body.details.unwrap().contains("aggregation"));
    }

    #[tokio::test]
    async fn test_bad_request_returns_400() {
        let error = ApiError::BadRequest("question must not be empty".into());
        let (status, body) = extract_response(error.into_response()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Bad request");
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse::new("Test error");
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"error\":\"Test error\""));
        assert!(!json.contains("details"));

        let response = ErrorResponse::with_details("Test error", "More info");
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"details\":\"More info\""));
    }
}
