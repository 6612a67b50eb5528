//! Team management operations.
//!
//! Issuing an invitation runs a fixed pipeline: authorization, rate
//! budget, input rules, duplicate handling, row creation, notification,
//! audit. The order is part of the contract; earlier failures must not
//! consume later resources (a denied actor spends no rate budget, a
//! rate-limited actor creates no row).

use std::sync::Arc;

use chrono::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::db::store::{StoreError, TeamStore, with_retry};
use crate::models::{
    AuditAction, AuditEvent, AuditEventResponse, Invitation, InvitationPreviewResponse,
    InvitationResponse, IssueInvitationRequest, MemberRecord, MembershipResponse,
    ProvisionProviderRequest, ProvisionProviderResponse, RequestOrigin, TeamRole, User,
};
use crate::services::audit::{AuditQuery, AuditRecorder};
use crate::services::authz::Authorizer;
use crate::services::clock::Clock;
use crate::services::email::{InvitationEmail, NotificationSender};
use crate::services::error::ServiceError;
use crate::services::rate_limit::{INVITE_ACTION, InviteRateLimiter};
use crate::utils::token::{generate_invite_token, hash_token};

#[derive(Clone)]
pub struct TeamService {
    store: Arc<dyn TeamStore>,
    authorizer: Authorizer,
    limiter: Arc<InviteRateLimiter>,
    notifier: Arc<dyn NotificationSender>,
    audit: AuditRecorder,
    clock: Arc<dyn Clock>,
    invite_expiry_hours: i64,
}

impl TeamService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn TeamStore>,
        authorizer: Authorizer,
        limiter: Arc<InviteRateLimiter>,
        notifier: Arc<dyn NotificationSender>,
        audit: AuditRecorder,
        clock: Arc<dyn Clock>,
        invite_expiry_hours: i64,
    ) -> Self {
        Self {
            store,
            authorizer,
            limiter,
            notifier,
            audit,
            clock,
            invite_expiry_hours,
        }
    }

    /// Issue an invitation to join `provider_id`.
    ///
    /// The rate check runs right after authorization and consumes an
    /// attempt even when a later step rejects the request. A pending
    /// invitation for the same email is a conflict while unexpired and is
    /// superseded once expired. A notification failure is terminal but
    /// leaves the created row in place for a later resend.
    #[instrument(skip_all, fields(provider_id = %provider_id, actor_id = %actor_id))]
    pub async fn issue_invitation(
        &self,
        provider_id: Uuid,
        actor_id: Uuid,
        request: IssueInvitationRequest,
        origin: &RequestOrigin,
    ) -> Result<InvitationResponse, ServiceError> {
        let grant = self
            .authorizer
            .authorize(actor_id, provider_id, TeamRole::Manager)
            .await?;

        let decision = self.limiter.check(actor_id, INVITE_ACTION);
        if !decision.allowed {
            return Err(ServiceError::RateLimited {
                retry_after_seconds: decision.retry_after_seconds,
            });
        }

        if request.role == TeamRole::Owner {
            return Err(ServiceError::InvalidInput(
                "The owner role cannot be granted by invitation".to_string(),
            ));
        }

        let actor_user = with_retry(|| self.store.find_user(actor_id))
            .await?
            .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("Actor user record missing")))?;

        let invite_email = request.email.to_lowercase();
        if invite_email == actor_user.email {
            return Err(ServiceError::InvalidInput(
                "You cannot invite your own email address".to_string(),
            ));
        }

        let expiry_hours = request.expires_in_hours.unwrap_or(self.invite_expiry_hours);
        if expiry_hours <= 0 {
            return Err(ServiceError::InvalidInput(
                "expires_in_hours must be positive".to_string(),
            ));
        }

        let mut superseded = false;
        if let Some(existing) =
            with_retry(|| self.store.find_pending_invitation(provider_id, &invite_email)).await?
        {
            if existing.is_expired_at(self.clock.now()) {
                with_retry(|| self.store.delete_pending_invitation(&grant, existing.invitation_id))
                    .await?;
                superseded = true;
            } else {
                return Err(ServiceError::Conflict(
                    "An active invitation already exists for this email".to_string(),
                ));
            }
        }

        let token = generate_invite_token();
        let invitation = Invitation::new(
            provider_id,
            invite_email,
            request.role,
            hash_token(&token),
            self.clock.now() + Duration::hours(expiry_hours),
            actor_id,
        );

        let invitation = with_retry(|| self.store.insert_invitation(&grant, invitation.clone()))
            .await
            .map_err(|e| match e {
                StoreError::Duplicate => ServiceError::Conflict(
                    "An active invitation already exists for this email".to_string(),
                ),
                other => other.into(),
            })?;

        self.notify_invitee(&invitation, token, &actor_user).await?;

        self.audit
            .record(AuditEvent::actor_action(
                provider_id,
                actor_id,
                AuditAction::InvitationSent,
                Some(invitation.invitation_id),
                Some(serde_json::json!({
                    "email": invitation.email,
                    "role": invitation.role_code,
                    "expiry_utc": invitation.expiry_utc,
                    "superseded_expired": superseded,
                })),
                origin,
            ))
            .await;

        Ok(InvitationResponse::from(invitation))
    }

    /// Accept an invitation presented as a raw token.
    #[instrument(skip_all)]
    pub async fn accept_invitation(
        &self,
        token: &str,
        display_name: Option<&str>,
        origin: &RequestOrigin,
    ) -> Result<MembershipResponse, ServiceError> {
        let token_hash = hash_token(token);
        let now = self.clock.now();

        let (invitation, membership) =
            with_retry(|| self.store.accept_invitation(&token_hash, display_name, now))
                .await
                .map_err(|e| match e {
                    StoreError::NotFound => {
                        ServiceError::NotFound("Invitation not found".to_string())
                    }
                    other => other.into(),
                })?;

        self.audit
            .record(AuditEvent::actor_action(
                invitation.provider_id,
                membership.user_id,
                AuditAction::InvitationAccepted,
                Some(invitation.invitation_id),
                Some(serde_json::json!({
                    "email": invitation.email,
                    "role": membership.role_code,
                })),
                origin,
            ))
            .await;

        Ok(MembershipResponse::from(membership))
    }

    /// Revoke a pending invitation. Requires the same role floor as
    /// issuing one.
    #[instrument(skip_all, fields(provider_id = %provider_id, invitation_id = %invitation_id))]
    pub async fn revoke_invitation(
        &self,
        provider_id: Uuid,
        invitation_id: Uuid,
        actor_id: Uuid,
        origin: &RequestOrigin,
    ) -> Result<InvitationResponse, ServiceError> {
        let grant = self
            .authorizer
            .authorize(actor_id, provider_id, TeamRole::Manager)
            .await?;

        let invitation = with_retry(|| self.store.find_invitation(provider_id, invitation_id))
            .await?
            .ok_or_else(|| ServiceError::NotFound("Invitation not found".to_string()))?;

        if !invitation.is_pending() {
            return Err(ServiceError::Conflict(
                "Only pending invitations can be revoked".to_string(),
            ));
        }

        let revoked = with_retry(|| self.store.mark_invitation_revoked(&grant, invitation_id))
            .await
            .map_err(|e| match e {
                // Lost a race with an accept or another revoke.
                StoreError::NotFound => ServiceError::Conflict(
                    "Only pending invitations can be revoked".to_string(),
                ),
                other => other.into(),
            })?;

        self.audit
            .record(AuditEvent::actor_action(
                provider_id,
                actor_id,
                AuditAction::InvitationRevoked,
                Some(invitation_id),
                Some(serde_json::json!({ "email": revoked.email })),
                origin,
            ))
            .await;

        Ok(InvitationResponse::from(revoked))
    }

    /// Send a fresh email for a pending invitation, rotating its token
    /// and expiry. Draws from the same rate budget as issuing.
    #[instrument(skip_all, fields(provider_id = %provider_id, invitation_id = %invitation_id))]
    pub async fn resend_invitation(
        &self,
        provider_id: Uuid,
        invitation_id: Uuid,
        actor_id: Uuid,
        origin: &RequestOrigin,
    ) -> Result<InvitationResponse, ServiceError> {
        let grant = self
            .authorizer
            .authorize(actor_id, provider_id, TeamRole::Manager)
            .await?;

        let decision = self.limiter.check(actor_id, INVITE_ACTION);
        if !decision.allowed {
            return Err(ServiceError::RateLimited {
                retry_after_seconds: decision.retry_after_seconds,
            });
        }

        let invitation = with_retry(|| self.store.find_invitation(provider_id, invitation_id))
            .await?
            .ok_or_else(|| ServiceError::NotFound("Invitation not found".to_string()))?;

        if !invitation.is_pending() {
            return Err(ServiceError::Conflict(
                "Only pending invitations can be resent".to_string(),
            ));
        }

        let actor_user = with_retry(|| self.store.find_user(actor_id))
            .await?
            .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("Actor user record missing")))?;

        // Rotating the token invalidates any previously mailed link; an
        // expired pending invitation comes back to life with the fresh
        // expiry.
        let token = generate_invite_token();
        let token_hash = hash_token(&token);
        let expiry_utc = self.clock.now() + Duration::hours(self.invite_expiry_hours);

        let invitation = with_retry(|| {
            self.store
                .rotate_invitation_token(&grant, invitation_id, &token_hash, expiry_utc)
        })
        .await
        .map_err(|e| match e {
            StoreError::NotFound => {
                ServiceError::Conflict("Only pending invitations can be resent".to_string())
            }
            other => other.into(),
        })?;

        self.notify_invitee(&invitation, token, &actor_user).await?;

        self.audit
            .record(AuditEvent::actor_action(
                provider_id,
                actor_id,
                AuditAction::InvitationResent,
                Some(invitation_id),
                Some(serde_json::json!({
                    "email": invitation.email,
                    "expiry_utc": invitation.expiry_utc,
                })),
                origin,
            ))
            .await;

        Ok(InvitationResponse::from(invitation))
    }

    /// Details for the acceptance page. Requires only the token.
    pub async fn preview_invitation(
        &self,
        token: &str,
    ) -> Result<InvitationPreviewResponse, ServiceError> {
        let token_hash = hash_token(token);

        let invitation = with_retry(|| self.store.find_invitation_by_token_hash(&token_hash))
            .await?
            .ok_or_else(|| ServiceError::NotFound("Invitation not found".to_string()))?;

        let provider = with_retry(|| self.store.find_provider(invitation.provider_id))
            .await?
            .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("Provider row missing")))?;

        let inviter = with_retry(|| self.store.find_user(invitation.invited_by)).await?;

        let is_valid = invitation.is_pending() && !invitation.is_expired_at(self.clock.now());

        Ok(InvitationPreviewResponse {
            provider_name: provider.display_name,
            email: invitation.email,
            role_code: invitation.role_code,
            invited_by: inviter.map(|u| u.visible_name().to_string()),
            expiry_utc: invitation.expiry_utc,
            is_valid,
        })
    }

    pub async fn list_invitations(
        &self,
        provider_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Vec<InvitationResponse>, ServiceError> {
        self.authorizer
            .authorize(actor_id, provider_id, TeamRole::Manager)
            .await?;

        let rows = with_retry(|| self.store.list_invitations(provider_id)).await?;
        Ok(rows.into_iter().map(InvitationResponse::from).collect())
    }

    /// Active roster of a provider. Any member may look.
    pub async fn list_members(
        &self,
        provider_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Vec<MemberRecord>, ServiceError> {
        self.authorizer
            .authorize(actor_id, provider_id, TeamRole::Viewer)
            .await?;

        Ok(with_retry(|| self.store.list_members(provider_id)).await?)
    }

    /// Change a member's role. The actor needs authority over both the
    /// member's current role and the new one; the owner is immutable and
    /// nobody edits themselves.
    #[instrument(skip_all, fields(provider_id = %provider_id, target_user_id = %target_user_id))]
    pub async fn change_member_role(
        &self,
        provider_id: Uuid,
        target_user_id: Uuid,
        actor_id: Uuid,
        new_role: TeamRole,
        origin: &RequestOrigin,
    ) -> Result<MembershipResponse, ServiceError> {
        let grant = self
            .authorizer
            .authorize(actor_id, provider_id, TeamRole::Manager)
            .await?;

        if target_user_id == actor_id {
            return Err(ServiceError::InvalidInput(
                "You cannot change your own role".to_string(),
            ));
        }
        if new_role == TeamRole::Owner {
            return Err(ServiceError::InvalidInput(
                "The owner role cannot be assigned".to_string(),
            ));
        }

        let target = with_retry(|| self.store.find_membership(provider_id, target_user_id))
            .await?
            .filter(|m| m.is_active())
            .ok_or_else(|| ServiceError::NotFound("Member not found".to_string()))?;

        let target_role = target.role()?;
        if target_role == TeamRole::Owner {
            return Err(ServiceError::InvalidInput(
                "The owner's role cannot be changed".to_string(),
            ));
        }
        if !grant.role().permits(target_role) || !grant.role().permits(new_role) {
            return Err(ServiceError::Forbidden);
        }

        let updated =
            with_retry(|| self.store.update_membership_role(&grant, target_user_id, new_role))
                .await
                .map_err(|e| match e {
                    StoreError::NotFound => ServiceError::NotFound("Member not found".to_string()),
                    other => other.into(),
                })?;

        self.audit
            .record(AuditEvent::actor_action(
                provider_id,
                actor_id,
                AuditAction::MemberRoleChanged,
                Some(target_user_id),
                Some(serde_json::json!({
                    "from_role": target.role_code,
                    "to_role": updated.role_code,
                })),
                origin,
            ))
            .await;

        Ok(MembershipResponse::from(updated))
    }

    /// Remove a member. Same authority rules as role changes; the owner
    /// stays.
    #[instrument(skip_all, fields(provider_id = %provider_id, target_user_id = %target_user_id))]
    pub async fn remove_member(
        &self,
        provider_id: Uuid,
        target_user_id: Uuid,
        actor_id: Uuid,
        origin: &RequestOrigin,
    ) -> Result<MembershipResponse, ServiceError> {
        let grant = self
            .authorizer
            .authorize(actor_id, provider_id, TeamRole::Manager)
            .await?;

        if target_user_id == actor_id {
            return Err(ServiceError::InvalidInput(
                "You cannot remove yourself".to_string(),
            ));
        }

        let target = with_retry(|| self.store.find_membership(provider_id, target_user_id))
            .await?
            .filter(|m| m.is_active())
            .ok_or_else(|| ServiceError::NotFound("Member not found".to_string()))?;

        let target_role = target.role()?;
        if target_role == TeamRole::Owner {
            return Err(ServiceError::InvalidInput(
                "The owner cannot be removed".to_string(),
            ));
        }
        if !grant.role().permits(target_role) {
            return Err(ServiceError::Forbidden);
        }

        let removed = with_retry(|| self.store.remove_membership(&grant, target_user_id))
            .await
            .map_err(|e| match e {
                StoreError::NotFound => ServiceError::NotFound("Member not found".to_string()),
                other => other.into(),
            })?;

        self.audit
            .record(AuditEvent::actor_action(
                provider_id,
                actor_id,
                AuditAction::MemberRemoved,
                Some(target_user_id),
                Some(serde_json::json!({ "role": removed.role_code })),
                origin,
            ))
            .await;

        Ok(MembershipResponse::from(removed))
    }

    /// Create a provider with its owner. Called by the platform during
    /// onboarding, not by team members.
    #[instrument(skip_all)]
    pub async fn provision_provider(
        &self,
        request: ProvisionProviderRequest,
    ) -> Result<ProvisionProviderResponse, ServiceError> {
        let (provider, user, membership) = with_retry(|| {
            self.store.create_provider_with_owner(
                &request.name,
                &request.owner_email,
                request.owner_name.as_deref(),
            )
        })
        .await
        .map_err(|e| match e {
            StoreError::Duplicate => ServiceError::Conflict(
                "Owner email conflicts with an existing record".to_string(),
            ),
            other => other.into(),
        })?;

        self.audit
            .record(AuditEvent::system_action(
                provider.provider_id,
                AuditAction::ProviderProvisioned,
                Some(user.user_id),
                Some(serde_json::json!({
                    "name": provider.display_name,
                    "owner_email": user.email,
                })),
            ))
            .await;

        Ok(ProvisionProviderResponse {
            provider: provider.into(),
            owner: user.into(),
            owner_membership: membership.into(),
        })
    }

    /// Audit trail for a provider. Admin floor.
    pub async fn list_audit_events(
        &self,
        provider_id: Uuid,
        actor_id: Uuid,
        query: AuditQuery,
    ) -> Result<(Vec<AuditEventResponse>, i64), ServiceError> {
        self.authorizer
            .authorize(actor_id, provider_id, TeamRole::Admin)
            .await?;

        let (events, total) = self.audit.list(provider_id, &query).await?;
        Ok((
            events.into_iter().map(AuditEventResponse::from).collect(),
            total,
        ))
    }

    pub async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(self.store.health_check().await?)
    }

    /// Fetch display context and hand the raw token to the notifier. A
    /// failure here is terminal for the operation; the invitation row
    /// stays behind so the caller can resend.
    async fn notify_invitee(
        &self,
        invitation: &Invitation,
        token: String,
        actor_user: &User,
    ) -> Result<(), ServiceError> {
        let provider = with_retry(|| self.store.find_provider(invitation.provider_id))
            .await?
            .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("Provider row missing")))?;

        let payload = InvitationEmail {
            to_email: invitation.email.clone(),
            provider_name: provider.display_name,
            inviter_name: actor_user.visible_name().to_string(),
            role: invitation.role()?,
            invite_token: token,
            expiry_utc: invitation.expiry_utc,
        };

        if let Err(e) = self.notifier.send_invitation(&payload).await {
            tracing::error!(
                invitation_id = %invitation.invitation_id,
                error = %e,
                "Invitation notification failed, row retained for resend"
            );
            return Err(ServiceError::Internal(
                e.context("Failed to send invitation notification"),
            ));
        }
        Ok(())
    }
}
