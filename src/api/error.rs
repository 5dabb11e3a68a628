//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::core_state::CoreError;
use crate::db::DatabaseError;
use crate::pipeline::evidence::EvidenceError;
use crate::pipeline::PipelineError;
use crate::store::StoreError;

const EMPTY_MESSAGE: &str = "メッセージが空です。話したいことを一言書いてください。";
const SAFE_MODE_MESSAGE: &str = "現在、安全のため応答を停止しています。管理者による再起動をお待ちください。";
const INTERNAL_MESSAGE: &str = "内部で問題が起きました。少し時間をおいて、もう一度お試しください。";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    /// A 400 with its own error code.
    #[error("{code}: {message}")]
    Rejected { code: &'static str, message: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: u64 },
    #[error("Safe mode engaged")]
    SafeMode,
    #[error("Not ready: {0}")]
    NotReady(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone()),
            ApiError::Rejected { code, message } => (StatusCode::BAD_REQUEST, *code, message.clone()),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                format!("リクエストが多すぎます。{retry_after}秒後にもう一度お試しください。"),
            ),
            ApiError::SafeMode => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SAFE_MODE",
                SAFE_MODE_MESSAGE.to_string(),
            ),
            ApiError::NotReady(detail) => (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY", detail.clone()),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    INTERNAL_MESSAGE.to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after } = &self {
            if let Ok(val) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("Retry-After", val);
            }
        }
        response
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::EmptyInput => ApiError::BadRequest(EMPTY_MESSAGE.into()),
            PipelineError::Evidence(EvidenceError::InvalidArgument(detail)) => {
                ApiError::BadRequest(format!("指定が正しくありません: {detail}"))
            }
            PipelineError::Evidence(e) => ApiError::Internal(e.to_string()),
            PipelineError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidSessionId => ApiError::BadRequest("セッションIDが正しくありません。".into()),
            StoreError::Database(e) => e.into(),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Store(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
