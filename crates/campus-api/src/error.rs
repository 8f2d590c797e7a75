use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use tracing::{error, warn};

use campus_types::api::ErrorBody;

pub type ApiResult<T> = Result<T, ApiError>;

/// Every failure a request can end in. Store errors arrive as `Internal`
/// and never leak their detail into the response body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    RateLimited {
        message: &'static str,
        remaining: u32,
        reset_time: DateTime<Utc>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                ErrorBody {
                    error: "Internal server error".into(),
                    remaining: None,
                    reset_time: None,
                }
            }
            Self::RateLimited { message, remaining, reset_time } => ErrorBody {
                error: (*message).into(),
                remaining: Some(*remaining),
                reset_time: Some(reset_time.timestamp_millis()),
            },
            other => {
                if matches!(other, Self::Forbidden(_)) {
                    warn!("Forbidden: {}", other);
                }
                ErrorBody {
                    error: other.to_string(),
                    remaining: None,
                    reset_time: None,
                }
            }
        };

        (status, Json(body)).into_response()
    }
}
