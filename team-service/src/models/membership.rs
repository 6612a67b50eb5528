//! Membership model - a user's role within a provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::role::{TeamRole, UnknownRoleError};

/// Membership status codes. `Pending` is part of the stored vocabulary
/// for seats awaiting a first login; every path in this service creates
/// seats directly as `Active` (the invitation row tracks the open offer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    Pending,
    Removed,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::Pending => "pending",
            MembershipStatus::Removed => "removed",
        }
    }
}

/// Membership entity. Rows are never deleted; removal flips the status.
#[derive(Debug, Clone, FromRow)]
pub struct Membership {
    pub membership_id: Uuid,
    pub provider_id: Uuid,
    pub user_id: Uuid,
    pub role_code: String,
    pub status_code: String,
    pub invited_by: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Membership {
    /// Create a new active membership.
    pub fn new(provider_id: Uuid, user_id: Uuid, role: TeamRole, invited_by: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            membership_id: Uuid::new_v4(),
            provider_id,
            user_id,
            role_code: role.as_str().to_string(),
            status_code: MembershipStatus::Active.as_str().to_string(),
            invited_by,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status_code == MembershipStatus::Active.as_str()
    }

    /// Decode the stored role code. Unknown codes are a hard error, never a
    /// silently-permissive fallback.
    pub fn role(&self) -> Result<TeamRole, UnknownRoleError> {
        self.role_code.parse()
    }
}

/// Request to change a member's role.
#[derive(Debug, Deserialize, Validate)]
pub struct ChangeMemberRoleRequest {
    pub role: TeamRole,
}

/// Membership response for API.
#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub membership_id: Uuid,
    pub provider_id: Uuid,
    pub user_id: Uuid,
    pub role_code: String,
    pub status_code: String,
    pub created_utc: DateTime<Utc>,
}

impl From<Membership> for MembershipResponse {
    fn from(m: Membership) -> Self {
        Self {
            membership_id: m.membership_id,
            provider_id: m.provider_id,
            user_id: m.user_id,
            role_code: m.role_code,
            status_code: m.status_code,
            created_utc: m.created_utc,
        }
    }
}

/// Membership joined with the member's user record, for roster listings.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MemberRecord {
    pub membership_id: Uuid,
    pub provider_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub role_code: String,
    pub status_code: String,
    pub created_utc: DateTime<Utc>,
}
