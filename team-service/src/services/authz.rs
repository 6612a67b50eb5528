//! Role checks and the authorization grant.
//!
//! Everything that mutates provider-scoped state goes through a two-step
//! trust boundary: first [`Authorizer::authorize`] proves the actor holds
//! an active membership whose role admits the required floor, then the
//! resulting [`AuthzGrant`] is what store write methods demand. Code that
//! never obtained a grant cannot reach an elevated write.

use std::sync::Arc;

use uuid::Uuid;

use crate::db::store::TeamStore;
use crate::models::TeamRole;
use crate::services::error::ServiceError;

/// Proof that an actor cleared a role check for one provider.
///
/// Fields are private and the only constructor outside this module is
/// [`Authorizer::authorize`], so holding a grant implies the checks
/// already passed.
#[derive(Debug, Clone)]
pub struct AuthzGrant {
    actor_id: Uuid,
    provider_id: Uuid,
    role: TeamRole,
}

impl AuthzGrant {
    pub fn actor_id(&self) -> Uuid {
        self.actor_id
    }

    pub fn provider_id(&self) -> Uuid {
        self.provider_id
    }

    /// The actor's actual role, which may sit above the floor that was
    /// checked.
    pub fn role(&self) -> TeamRole {
        self.role
    }
}

#[derive(Clone)]
pub struct Authorizer {
    store: Arc<dyn TeamStore>,
}

impl Authorizer {
    pub fn new(store: Arc<dyn TeamStore>) -> Self {
        Self { store }
    }

    /// Verify that `actor_id` holds an active membership in `provider_id`
    /// whose role admits `floor`, and mint a grant scoped to that
    /// provider.
    ///
    /// A missing membership, a removed membership and an insufficient
    /// role all come back as [`ServiceError::Forbidden`]; callers get no
    /// signal to distinguish outsiders from under-privileged members.
    pub async fn authorize(
        &self,
        actor_id: Uuid,
        provider_id: Uuid,
        floor: TeamRole,
    ) -> Result<AuthzGrant, ServiceError> {
        let membership = self
            .store
            .find_membership(provider_id, actor_id)
            .await?
            .filter(|m| m.is_active())
            .ok_or(ServiceError::Forbidden)?;

        let role = membership.role()?;
        if !role.permits(floor) {
            return Err(ServiceError::Forbidden);
        }

        Ok(AuthzGrant {
            actor_id,
            provider_id,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryTeamStore;

    async fn fixture() -> (Arc<MemoryTeamStore>, Authorizer) {
        let store = Arc::new(MemoryTeamStore::new());
        let authorizer = Authorizer::new(store.clone());
        (store, authorizer)
    }

    #[tokio::test]
    async fn authorize_rejects_outsiders() {
        let (store, authorizer) = fixture().await;
        let provider = store.seed_provider("Plated Well").await;

        let err = authorizer
            .authorize(Uuid::new_v4(), provider.provider_id, TeamRole::Viewer)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
    }

    #[tokio::test]
    async fn authorize_rejects_removed_members() {
        let (store, authorizer) = fixture().await;
        let provider = store.seed_provider("Plated Well").await;
        let (owner, _) = store
            .seed_member(provider.provider_id, "owner@example.com", TeamRole::Owner)
            .await;
        let (user, _) = store
            .seed_member(provider.provider_id, "gone@example.com", TeamRole::Admin)
            .await;

        let grant = authorizer
            .authorize(owner.user_id, provider.provider_id, TeamRole::Manager)
            .await
            .unwrap();
        store.remove_membership(&grant, user.user_id).await.unwrap();

        let err = authorizer
            .authorize(user.user_id, provider.provider_id, TeamRole::Viewer)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
    }

    #[tokio::test]
    async fn authorize_enforces_the_role_floor() {
        let (store, authorizer) = fixture().await;
        let provider = store.seed_provider("Plated Well").await;
        let (staff, _) = store
            .seed_member(provider.provider_id, "staff@example.com", TeamRole::Staff)
            .await;

        let err = authorizer
            .authorize(staff.user_id, provider.provider_id, TeamRole::Manager)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));

        let grant = authorizer
            .authorize(staff.user_id, provider.provider_id, TeamRole::Staff)
            .await
            .unwrap();
        assert_eq!(grant.actor_id(), staff.user_id);
        assert_eq!(grant.provider_id(), provider.provider_id);
        assert_eq!(grant.role(), TeamRole::Staff);
    }

    #[tokio::test]
    async fn authorize_is_scoped_to_one_provider() {
        let (store, authorizer) = fixture().await;
        let home = store.seed_provider("Plated Well").await;
        let other = store.seed_provider("Crumb & Co").await;
        let (admin, _) = store
            .seed_member(home.provider_id, "admin@example.com", TeamRole::Admin)
            .await;

        let err = authorizer
            .authorize(admin.user_id, other.provider_id, TeamRole::Viewer)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
    }
}
