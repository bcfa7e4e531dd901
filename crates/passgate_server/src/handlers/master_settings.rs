//! GET|PUT /master-settings: master administrators only.

use axum::extract::rejection::JsonRejection;
use axum::{Extension, Json};
use passgate_core::admin::SettingsOverview;
use passgate_core::types::{GlobalSettings, SettingsPatch};
use passgate_core::Admission;

use crate::error::AppError;
use crate::state::AppState;

pub async fn get_settings(
    Extension(state): Extension<AppState>,
    Extension(admission): Extension<Admission>,
) -> Result<Json<SettingsOverview>, AppError> {
    Ok(Json(state.admin.settings_overview(&admission.identity).await?))
}

pub async fn update_settings(
    Extension(state): Extension<AppState>,
    Extension(admission): Extension<Admission>,
    patch: Result<Json<SettingsPatch>, JsonRejection>,
) -> Result<Json<GlobalSettings>, AppError> {
    let Json(patch) = patch?;
    Ok(Json(
        state.admin.update_settings(&admission.identity, patch).await?,
    ))
}
