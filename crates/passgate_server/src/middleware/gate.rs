//! Request gate: resolves the selected identity and runs the authorization
//! gate. On allow, the [`Admission`] is attached to the request for handlers.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use passgate_core::{Admission, Verdict};

use crate::error::AppError;
use crate::selection::{parse_selected, SELECTED_IDENTITY_HEADER};
use crate::state::AppState;

pub async fn require_admission(
    Extension(state): Extension<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let raw = request
        .headers()
        .get(SELECTED_IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok());
    let identity_id = match parse_selected(raw) {
        Ok(id) => id,
        Err(e) => return AppError::Selection(e).into_response(),
    };

    match state.gate.authorize(identity_id).await {
        Verdict::Allow(admission) => {
            request.extensions_mut().insert::<Admission>(admission);
            next.run(request).await
        }
        Verdict::Deny(reason) => {
            tracing::debug!(identity = %identity_id, code = reason.code(), "request denied");
            AppError::Denied(reason).into_response()
        }
    }
}
