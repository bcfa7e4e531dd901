//! GET /users/active: identity picker roster.

use axum::{Extension, Json};
use passgate_core::types::RosterEntry;

use crate::error::AppError;
use crate::state::AppState;

pub async fn active_users(
    Extension(state): Extension<AppState>,
) -> Result<Json<Vec<RosterEntry>>, AppError> {
    Ok(Json(state.admin.active_roster().await?))
}
