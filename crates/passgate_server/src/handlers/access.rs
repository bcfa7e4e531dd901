//! GET /access: what the gate admitted the caller as.

use axum::{Extension, Json};
use passgate_core::types::{Identity, PassView};
use passgate_core::Admission;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub identity: Identity,
    pub pass: Option<PassView>,
}

pub async fn current_access(
    Extension(state): Extension<AppState>,
    Extension(admission): Extension<Admission>,
) -> Json<AccessResponse> {
    let now = state.clock.now();
    Json(AccessResponse {
        pass: admission.pass.as_ref().map(|p| p.view(now)),
        identity: admission.identity,
    })
}
