//! Administrative handlers.
//!
//! GET   /admin/users              : every identity with its live passes
//! POST  /admin/users              : create an identity
//! PATCH /admin/users/:id          : partial identity update
//! POST  /admin/passes             : issue a pending pass to a TEMPORARY identity
//! PATCH /admin/passes/:id/revoke  : revoke a pass
//!
//! The acting identity is the gate's admission; role checks live in
//! [`passgate_core::admin::AdminService`].

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::Path;
use axum::{Extension, Json};
use passgate_core::admin::{IdentityWithPasses, IssuedPass};
use passgate_core::types::*;
use passgate_core::Admission;
use serde::Deserialize;

use crate::error::{path_id, AppError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IssuePassRequest {
    pub identity_id: IdentityId,
    pub category: PassCategory,
}

pub async fn list_users(
    Extension(state): Extension<AppState>,
    Extension(admission): Extension<Admission>,
) -> Result<Json<Vec<IdentityWithPasses>>, AppError> {
    Ok(Json(state.admin.list_identities(&admission.identity).await?))
}

pub async fn create_user(
    Extension(state): Extension<AppState>,
    Extension(admission): Extension<Admission>,
    body: Result<Json<NewIdentity>, JsonRejection>,
) -> Result<Json<Identity>, AppError> {
    let Json(body) = body?;
    let created = state.admin.create_identity(&admission.identity, body).await?;
    Ok(Json(created))
}

pub async fn update_user(
    Extension(state): Extension<AppState>,
    Extension(admission): Extension<Admission>,
    id: Result<Path<i64>, PathRejection>,
    patch: Result<Json<IdentityPatch>, JsonRejection>,
) -> Result<Json<Identity>, AppError> {
    let id = path_id(id, "user")?;
    let Json(patch) = patch?;
    let updated = state
        .admin
        .update_identity(&admission.identity, IdentityId(id), patch)
        .await?;
    Ok(Json(updated))
}

pub async fn issue_pass(
    Extension(state): Extension<AppState>,
    Extension(admission): Extension<Admission>,
    body: Result<Json<IssuePassRequest>, JsonRejection>,
) -> Result<Json<IssuedPass>, AppError> {
    let Json(body) = body?;
    let issued = state
        .admin
        .issue_pass(&admission.identity, body.identity_id, body.category)
        .await?;
    Ok(Json(issued))
}

pub async fn revoke_pass(
    Extension(state): Extension<AppState>,
    Extension(admission): Extension<Admission>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<PassView>, AppError> {
    let id = path_id(id, "pass")?;
    let pass = state
        .admin
        .revoke_pass(&admission.identity, PassId(id))
        .await?;
    Ok(Json(pass.view(state.clock.now())))
}
