//! Centralized API error type.
//!
//! Every handler returns `Result<T, ApiError>`. `ApiError` renders the JSON
//! envelope `{error, details?, job?}` and picks the status code from the
//! error taxonomy.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use serde_json::Value;

use crate::publish::chain::ChainError;
use crate::publish::uploader::UploaderError;
use crate::publish::PublishError;
use crate::resolver::ResolverError;
use crate::studyset::{LlmError, StudySetError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("gone: {0}")]
    Gone(String),
    #[error("rate limited")]
    RateLimited,
    #[error("upstream error: {0}")]
    BadGateway(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("upstream unavailable: {0}")]
    ServiceUnavailable(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job: Option<Value>,
}

impl ApiError {
    pub fn with_job(self, job: Value) -> WithJob {
        WithJob { error: self, job }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Gone(_) => StatusCode::GONE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// An `ApiError` paired with the job snapshot that should ride along in the
/// response body (the spec requires 409/410 publish errors to include the
/// job's current state so the caller can resync without a follow-up GET).
pub struct WithJob {
    error: ApiError,
    job: Value,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(status = %status, "{}", self);
        let body = ErrorBody {
            error: self.to_string(),
            details: None,
            job: None,
        };
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for WithJob {
    fn into_response(self) -> Response {
        let status = self.error.status();
        tracing::warn!(status = %status, "{}", self.error);
        let body = ErrorBody {
            error: self.error.to_string(),
            details: None,
            job: Some(self.job),
        };
        (status, Json(body)).into_response()
    }
}

impl From<PublishError> for ApiError {
    fn from(e: PublishError) -> Self {
        match e {
            PublishError::NotFound(id) => ApiError::NotFound(format!("job {id} not found")),
            PublishError::Conflict(msg) => ApiError::Conflict(msg),
            PublishError::InvalidState(msg) => ApiError::Conflict(msg),
            PublishError::Validation(msg) => ApiError::BadRequest(msg),
            PublishError::RateLimited(msg) => {
                tracing::info!("publish rate limit: {msg}");
                ApiError::RateLimited
            }
            PublishError::Gone(msg) => ApiError::Gone(msg),
            PublishError::Uploader(e) => e.into(),
            PublishError::Chain(e) => e.into(),
            PublishError::Store(e) => ApiError::Internal(e.to_string()),
            PublishError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<UploaderError> for ApiError {
    fn from(e: UploaderError) -> Self {
        match e {
            UploaderError::RateLimited => ApiError::RateLimited,
            UploaderError::Transport(msg) | UploaderError::Api(msg) => ApiError::BadGateway(msg),
            UploaderError::Timeout => ApiError::BadGateway("uploader timed out".into()),
        }
    }
}

impl From<ChainError> for ApiError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::RateLimited => ApiError::RateLimited,
            ChainError::Rpc(msg) | ChainError::Encoding(msg) => ApiError::BadGateway(msg),
            ChainError::Timeout => {
                ApiError::ServiceUnavailable("chain transaction still pending".into())
            }
            ChainError::Reverted(msg) => ApiError::BadGateway(format!("transaction reverted: {msg}")),
        }
    }
}

impl From<StudySetError> for ApiError {
    fn from(e: StudySetError) -> Self {
        match e {
            StudySetError::Validation(msg) => ApiError::BadRequest(msg),
            StudySetError::Llm(e) => e.into(),
            StudySetError::Generation(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Connection(msg) => ApiError::BadGateway(msg),
            LlmError::Timeout => ApiError::BadGateway("language model request timed out".into()),
            LlmError::RateLimited => ApiError::RateLimited,
            LlmError::Api { status, message } => {
                ApiError::BadGateway(format!("language model returned {status}: {message}"))
            }
            LlmError::InvalidResponse(msg) => ApiError::BadGateway(msg),
        }
    }
}

impl From<ResolverError> for ApiError {
    fn from(e: ResolverError) -> Self {
        match e {
            ResolverError::Validation(msg) => ApiError::BadRequest(msg),
            ResolverError::Upstream(msg) => ApiError::BadGateway(msg),
            ResolverError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<ApiError> for WithJob {
    fn from(error: ApiError) -> Self {
        WithJob { error, job: Value::Null }
    }
}

impl From<anyhow::Error> for WithJob {
    fn from(e: anyhow::Error) -> Self {
        ApiError::from(e).into()
    }
}

impl From<PublishError> for WithJob {
    fn from(e: PublishError) -> Self {
        ApiError::from(e).into()
    }
}
