//! HTTP error type. Every failure leaves the server as `{"error": "..."}`.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use passgate_core::{DenyReason, PassGateError};

use crate::selection::SelectionError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] PassGateError),

    /// Gate denial. The body also carries the stable code.
    #[error("{}", .0.message())]
    Denied(DenyReason),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("{0}")]
    Unauthorized(&'static str),

    /// Request that axum could not extract (bad path segment, malformed body).
    #[error("{message}")]
    Malformed { status: StatusCode, message: String },
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Malformed {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

/// Unwrap a numeric path id, naming the entity in the error.
pub fn path_id(id: Result<Path<i64>, PathRejection>, entity: &str) -> Result<i64, AppError> {
    match id {
        Ok(Path(id)) => Ok(id),
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "rejected path parameter");
            Err(AppError::Malformed {
                status: StatusCode::BAD_REQUEST,
                message: format!("Invalid {entity} ID"),
            })
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        let code = match self {
            Self::Core(e) => e.http_status(),
            Self::Denied(reason) => reason.http_status(),
            Self::Selection(e) => e.http_status(),
            Self::Unauthorized(_) => 401,
            Self::Malformed { status, .. } => return *status,
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Core(e) => {
                if let PassGateError::Internal(inner) = e {
                    tracing::error!(error = %inner, "internal error");
                }
                serde_json::json!({ "error": e.public_message() })
            }
            Self::Denied(reason) => {
                serde_json::json!({ "error": reason.message(), "code": reason.code() })
            }
            other => serde_json::json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
