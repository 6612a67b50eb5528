//! Membership handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

use crate::AppState;
use crate::middleware::ActorIdentity;
use crate::models::{ChangeMemberRoleRequest, MemberRecord, MembershipResponse, RequestOrigin};
use crate::utils::ValidatedJson;
use service_core::error::AppError;

/// List the active members of a provider.
///
/// GET /providers/:provider_id/members
#[tracing::instrument(skip_all, fields(provider_id = %provider_id))]
pub async fn list_members(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
    actor: ActorIdentity,
) -> Result<Json<Vec<MemberRecord>>, AppError> {
    let members = state.team.list_members(provider_id, actor.user_id).await?;

    Ok(Json(members))
}

/// Change a member's role.
///
/// PATCH /providers/:provider_id/members/:user_id
#[tracing::instrument(skip_all, fields(provider_id = %provider_id, user_id = %user_id))]
pub async fn change_member_role(
    State(state): State<AppState>,
    Path((provider_id, user_id)): Path<(Uuid, Uuid)>,
    actor: ActorIdentity,
    origin: RequestOrigin,
    ValidatedJson(req): ValidatedJson<ChangeMemberRoleRequest>,
) -> Result<Json<MembershipResponse>, AppError> {
    let membership = state
        .team
        .change_member_role(provider_id, user_id, actor.user_id, req.role, &origin)
        .await?;

    Ok(Json(membership))
}

/// Remove a member from the team.
///
/// DELETE /providers/:provider_id/members/:user_id
#[tracing::instrument(skip_all, fields(provider_id = %provider_id, user_id = %user_id))]
pub async fn remove_member(
    State(state): State<AppState>,
    Path((provider_id, user_id)): Path<(Uuid, Uuid)>,
    actor: ActorIdentity,
    origin: RequestOrigin,
) -> Result<Json<MembershipResponse>, AppError> {
    let membership = state
        .team
        .remove_member(provider_id, user_id, actor.user_id, &origin)
        .await?;

    Ok(Json(membership))
}
