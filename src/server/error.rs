use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::server::extraction::model::ExtractionErrorKind;

pub type AppResult<T> = Result<T, Error>;

/// crate-wide error type, mapped to an HTTP response at the edge of the app.
/// every variant here is something a handler actually returns - internal plumbing
/// errors get wrapped into InternalServerErrorWithContext so the cause isn't lost.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("too many requests, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("upstream failure: {0}")]
    OriginFailure(String),

    #[error("extraction failed: {0:?}")]
    Extraction(ExtractionErrorKind),

    #[error("internal server error")]
    InternalServerError,

    #[error("internal server error: {0}")]
    InternalServerErrorWithContext(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

impl Error {
    fn kind(&self) -> &'static str {
        match self {
            Error::BadRequest(_) => "invalid_params",
            Error::Unauthorized => "unauthorized",
            Error::NotFound(_) => "not_found",
            Error::Forbidden(_) => "forbidden",
            Error::RateLimited { .. } => "rate_limited",
            Error::OriginFailure(_) => "origin_failure",
            Error::Extraction(kind) => kind.as_str(),
            Error::InternalServerError | Error::InternalServerErrorWithContext(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::OriginFailure(_) => StatusCode::BAD_GATEWAY,
            Error::Extraction(kind) => kind.status(),
            Error::InternalServerError | Error::InternalServerErrorWithContext(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        // internal errors get logged with full context, nothing leaks to the body
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(target: "error", "{}", self);
        }

        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
            request_id: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::InternalServerErrorWithContext(err.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::InternalServerErrorWithContext(format!("redis: {err}"))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::OriginFailure(err.to_string())
    }
}
