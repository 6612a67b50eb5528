//! Invitation model - time-boxed invitations with pre-assigned roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::role::{TeamRole, UnknownRoleError};

/// Invitation state codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationState {
    Pending,
    Accepted,
    Revoked,
}

impl InvitationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationState::Pending => "pending",
            InvitationState::Accepted => "accepted",
            InvitationState::Revoked => "revoked",
        }
    }
}

/// Invitation entity.
///
/// Only the SHA-256 hash of the invite token is stored; the raw token leaves
/// the service exactly once, inside the notification to the invitee.
#[derive(Debug, Clone, FromRow)]
pub struct Invitation {
    pub invitation_id: Uuid,
    pub provider_id: Uuid,
    pub email: String,
    pub role_code: String,
    pub token_hash: String,
    pub state_code: String,
    pub expiry_utc: DateTime<Utc>,
    pub accepted_utc: Option<DateTime<Utc>>,
    pub invited_by: Uuid,
    pub created_utc: DateTime<Utc>,
}

impl Invitation {
    /// Create a new pending invitation. The email is stored lowercased.
    pub fn new(
        provider_id: Uuid,
        email: String,
        role: TeamRole,
        token_hash: String,
        expiry_utc: DateTime<Utc>,
        invited_by: Uuid,
    ) -> Self {
        Self {
            invitation_id: Uuid::new_v4(),
            provider_id,
            email: email.to_lowercase(),
            role_code: role.as_str().to_string(),
            token_hash,
            state_code: InvitationState::Pending.as_str().to_string(),
            expiry_utc,
            accepted_utc: None,
            invited_by,
            created_utc: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state_code == InvitationState::Pending.as_str()
    }

    pub fn is_accepted(&self) -> bool {
        self.state_code == InvitationState::Accepted.as_str()
    }

    pub fn is_revoked(&self) -> bool {
        self.state_code == InvitationState::Revoked.as_str()
    }

    /// The expiry boundary itself counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_utc
    }

    /// Decode the stored role code, failing on unknown codes.
    pub fn role(&self) -> Result<TeamRole, UnknownRoleError> {
        self.role_code.parse()
    }
}

/// Request to issue an invitation.
#[derive(Debug, Deserialize, Validate)]
pub struct IssueInvitationRequest {
    #[validate(email)]
    pub email: String,
    pub role: TeamRole,
    pub expires_in_hours: Option<i64>,
}

/// Request to accept an invitation via its token.
#[derive(Debug, Deserialize, Validate)]
pub struct AcceptInvitationRequest {
    #[validate(length(min = 1))]
    pub token: String,
    #[validate(length(min = 1, max = 200))]
    pub display_name: Option<String>,
}

/// Invitation response for API. Carries no token material.
#[derive(Debug, Serialize)]
pub struct InvitationResponse {
    pub invitation_id: Uuid,
    pub provider_id: Uuid,
    pub email: String,
    pub role_code: String,
    pub state_code: String,
    pub expiry_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl From<Invitation> for InvitationResponse {
    fn from(i: Invitation) -> Self {
        Self {
            invitation_id: i.invitation_id,
            provider_id: i.provider_id,
            email: i.email,
            role_code: i.role_code,
            state_code: i.state_code,
            expiry_utc: i.expiry_utc,
            created_utc: i.created_utc,
        }
    }
}

/// Details shown on the acceptance page before the invitee commits.
#[derive(Debug, Serialize)]
pub struct InvitationPreviewResponse {
    pub provider_name: String,
    pub email: String,
    pub role_code: String,
    pub invited_by: Option<String>,
    pub expiry_utc: DateTime<Utc>,
    pub is_valid: bool,
}
