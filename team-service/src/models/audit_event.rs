//! Audit event model - the append-only record of team-management actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Actions recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ProviderProvisioned,
    InvitationSent,
    InvitationResent,
    InvitationAccepted,
    InvitationRevoked,
    MemberRoleChanged,
    MemberRemoved,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ProviderProvisioned => "provider_provisioned",
            AuditAction::InvitationSent => "invitation_sent",
            AuditAction::InvitationResent => "invitation_resent",
            AuditAction::InvitationAccepted => "invitation_accepted",
            AuditAction::InvitationRevoked => "invitation_revoked",
            AuditAction::MemberRoleChanged => "member_role_changed",
            AuditAction::MemberRemoved => "member_removed",
        }
    }
}

/// Where a request physically came from, as far as the gateway tells us.
#[derive(Debug, Clone, Default)]
pub struct RequestOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// One audit trail entry.
#[derive(Debug, Clone, FromRow)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub provider_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action_code: String,
    pub target_id: Option<Uuid>,
    pub detail: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl AuditEvent {
    /// Record an action performed by a known member.
    pub fn actor_action(
        provider_id: Uuid,
        actor_user_id: Uuid,
        action: AuditAction,
        target_id: Option<Uuid>,
        detail: Option<serde_json::Value>,
        origin: &RequestOrigin,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            provider_id,
            actor_user_id: Some(actor_user_id),
            action_code: action.as_str().to_string(),
            target_id,
            detail,
            ip_address: origin.ip_address.clone(),
            user_agent: origin.user_agent.clone(),
            created_utc: Utc::now(),
        }
    }

    /// Record an action with no acting member, such as system provisioning.
    pub fn system_action(
        provider_id: Uuid,
        action: AuditAction,
        target_id: Option<Uuid>,
        detail: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            provider_id,
            actor_user_id: None,
            action_code: action.as_str().to_string(),
            target_id,
            detail,
            ip_address: None,
            user_agent: None,
            created_utc: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditEventResponse {
    pub event_id: Uuid,
    pub provider_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action_code: String,
    pub target_id: Option<Uuid>,
    pub detail: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl From<AuditEvent> for AuditEventResponse {
    fn from(e: AuditEvent) -> Self {
        Self {
            event_id: e.event_id,
            provider_id: e.provider_id,
            actor_user_id: e.actor_user_id,
            action_code: e.action_code,
            target_id: e.target_id,
            detail: e.detail,
            ip_address: e.ip_address,
            user_agent: e.user_agent,
            created_utc: e.created_utc,
        }
    }
}
