//! Provider model - the tenant that owns memberships and invitations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::membership::MembershipResponse;
use crate::models::user::UserResponse;

/// Catering provider (tenant) entity.
#[derive(Debug, Clone, FromRow)]
pub struct Provider {
    pub provider_id: Uuid,
    pub display_name: String,
    pub created_utc: DateTime<Utc>,
}

impl Provider {
    pub fn new(display_name: String) -> Self {
        Self {
            provider_id: Uuid::new_v4(),
            display_name,
            created_utc: Utc::now(),
        }
    }
}

/// Request to provision a provider with its initial owner.
#[derive(Debug, Deserialize, Validate)]
pub struct ProvisionProviderRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub owner_email: String,
    #[validate(length(min = 1, max = 200))]
    pub owner_name: Option<String>,
}

/// Provider response for API.
#[derive(Debug, Serialize)]
pub struct ProviderResponse {
    pub provider_id: Uuid,
    pub display_name: String,
    pub created_utc: DateTime<Utc>,
}

impl From<Provider> for ProviderResponse {
    fn from(p: Provider) -> Self {
        Self {
            provider_id: p.provider_id,
            display_name: p.display_name,
            created_utc: p.created_utc,
        }
    }
}

/// Result of provisioning: the provider plus its owner's identity and seat.
#[derive(Debug, Serialize)]
pub struct ProvisionProviderResponse {
    pub provider: ProviderResponse,
    pub owner: UserResponse,
    pub owner_membership: MembershipResponse,
}
