use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

/// Error kinds of the public envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorKind {
    Validation,
    Unauthorized,
    NotFound,
    StateConflict,
    SessionBusy,
    ProviderUnavailable,
    ProviderInvalid,
    IndexUnavailable,
    Internal,
}

impl ApiErrorKind {
    fn status(self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::StateConflict | Self::SessionBusy => StatusCode::CONFLICT,
            Self::ProviderUnavailable | Self::IndexUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::ProviderInvalid => StatusCode::BAD_GATEWAY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn retryable(self) -> bool {
        matches!(
            self,
            Self::StateConflict
                | Self::SessionBusy
                | Self::ProviderUnavailable
                | Self::IndexUnavailable
        )
    }
}

#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Unauthorized, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Validation, message)
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(message) => Self::new(ApiErrorKind::Validation, message),
            AppError::Auth(message) => Self::new(ApiErrorKind::Unauthorized, message),
            AppError::NotFound(message) => Self::new(ApiErrorKind::NotFound, message),
            AppError::StateConflict(message) => Self::new(ApiErrorKind::StateConflict, message),
            AppError::SessionBusy(message) => Self::new(ApiErrorKind::SessionBusy, message),
            AppError::ProviderUnavailable(message) => {
                Self::new(ApiErrorKind::ProviderUnavailable, message)
            }
            AppError::ProviderInvalid(message) => {
                Self::new(ApiErrorKind::ProviderInvalid, message)
            }
            AppError::IndexUnavailable(message) => {
                Self::new(ApiErrorKind::IndexUnavailable, message)
            }
            other => {
                // Database, index corruption and invariant failures never
                // leak detail to the caller.
                tracing::error!("Internal error: {:?}", other);
                Self::new(ApiErrorKind::Internal, "Internal server error")
            }
        }
    }
}

#[derive(Serialize, Debug)]
struct ErrorBody {
    kind: ApiErrorKind,
    message: String,
    retryable: bool,
}

#[derive(Serialize, Debug)]
struct ErrorEnvelope {
    error: ErrorBody,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        let envelope = ErrorEnvelope {
            error: ErrorBody {
                kind: self.kind,
                message: self.message,
                retryable: self.kind.retryable(),
            },
        };

        (status, Json(envelope)).into_response()
    }
}
