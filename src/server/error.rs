// SPDX-License-Identifier: MIT

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::error::{PlaybookError, SchemaError, StorageError};

/// Error returned by every fallible handler
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input: bad condition syntax, bad variable definitions
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Document rejected by the validator
    #[error(transparent)]
    Invalid(#[from] SchemaError),

    /// Well-formed condition that could not be evaluated
    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Storage deadline of {0:?} exceeded")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Invalid(_) | ApiError::UnprocessableEntity(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PlaybookError> for ApiError {
    fn from(err: PlaybookError) -> Self {
        match err {
            PlaybookError::Schema(e) => ApiError::Invalid(e),
            PlaybookError::Storage(e) => e.into(),
            PlaybookError::Syntax(_)
            | PlaybookError::Variable(_)
            | PlaybookError::Json(_)
            | PlaybookError::Yaml(_) => ApiError::BadRequest(err.to_string()),
            PlaybookError::Resolution(_) | PlaybookError::Type(_) | PlaybookError::Evaluation(_) => {
                ApiError::UnprocessableEntity(err.to_string())
            }
            PlaybookError::Config(_) | PlaybookError::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Timeout(deadline) => ApiError::Timeout(deadline),
            e @ StorageError::DuplicatePageId { .. } => ApiError::Conflict(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{}", self);
        }

        let body = match &self {
            ApiError::Invalid(e) => json!({
                "error": self.to_string(),
                "errors": e.errors,
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
