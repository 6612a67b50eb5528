//! Invitation handlers.
//!
//! Team-scoped routes authenticate via the gateway's `x-actor-id` header;
//! accept and preview are public and authorized by the bearer token alone.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::AppState;
use crate::middleware::ActorIdentity;
use crate::models::{
    AcceptInvitationRequest, InvitationPreviewResponse, InvitationResponse,
    IssueInvitationRequest, MembershipResponse, RequestOrigin,
};
use crate::utils::ValidatedJson;
use service_core::error::AppError;

/// Issue an invitation to join a provider's team.
///
/// POST /providers/:provider_id/invitations
#[tracing::instrument(skip_all, fields(provider_id = %provider_id))]
pub async fn issue_invitation(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
    actor: ActorIdentity,
    origin: RequestOrigin,
    ValidatedJson(req): ValidatedJson<IssueInvitationRequest>,
) -> Result<(StatusCode, Json<InvitationResponse>), AppError> {
    let invitation = state
        .team
        .issue_invitation(provider_id, actor.user_id, req, &origin)
        .await?;

    Ok((StatusCode::CREATED, Json(invitation)))
}

/// List a provider's invitations.
///
/// GET /providers/:provider_id/invitations
#[tracing::instrument(skip_all, fields(provider_id = %provider_id))]
pub async fn list_invitations(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
    actor: ActorIdentity,
) -> Result<Json<Vec<InvitationResponse>>, AppError> {
    let invitations = state
        .team
        .list_invitations(provider_id, actor.user_id)
        .await?;

    Ok(Json(invitations))
}

/// Revoke a pending invitation.
///
/// DELETE /providers/:provider_id/invitations/:invitation_id
#[tracing::instrument(skip_all, fields(provider_id = %provider_id, invitation_id = %invitation_id))]
pub async fn revoke_invitation(
    State(state): State<AppState>,
    Path((provider_id, invitation_id)): Path<(Uuid, Uuid)>,
    actor: ActorIdentity,
    origin: RequestOrigin,
) -> Result<Json<InvitationResponse>, AppError> {
    let invitation = state
        .team
        .revoke_invitation(provider_id, invitation_id, actor.user_id, &origin)
        .await?;

    Ok(Json(invitation))
}

/// Resend a pending invitation with a rotated token.
///
/// POST /providers/:provider_id/invitations/:invitation_id/resend
#[tracing::instrument(skip_all, fields(provider_id = %provider_id, invitation_id = %invitation_id))]
pub async fn resend_invitation(
    State(state): State<AppState>,
    Path((provider_id, invitation_id)): Path<(Uuid, Uuid)>,
    actor: ActorIdentity,
    origin: RequestOrigin,
) -> Result<Json<InvitationResponse>, AppError> {
    let invitation = state
        .team
        .resend_invitation(provider_id, invitation_id, actor.user_id, &origin)
        .await?;

    Ok(Json(invitation))
}

/// Accept an invitation with its raw token.
///
/// POST /invitations/accept
#[tracing::instrument(skip_all)]
pub async fn accept_invitation(
    State(state): State<AppState>,
    origin: RequestOrigin,
    ValidatedJson(req): ValidatedJson<AcceptInvitationRequest>,
) -> Result<(StatusCode, Json<MembershipResponse>), AppError> {
    let membership = state
        .team
        .accept_invitation(&req.token, req.display_name.as_deref(), &origin)
        .await?;

    Ok((StatusCode::CREATED, Json(membership)))
}

/// Invitation details for the acceptance page.
///
/// GET /invitations/:token
#[tracing::instrument(skip_all)]
pub async fn preview_invitation(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<InvitationPreviewResponse>, AppError> {
    let preview = state.team.preview_invitation(&token).await?;

    Ok(Json(preview))
}
