//! In-memory team store for tests.
//!
//! One mutex over all tables keeps every operation serialized, which is
//! exactly what the uniqueness rules need, and `fail_next_ops` injects
//! transient outages so retry behavior can be exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::store::{StoreError, TeamStore};
use crate::models::{
    Invitation, MemberRecord, Membership, MembershipStatus, Provider, TeamRole, User,
};
use crate::services::authz::AuthzGrant;

#[derive(Default)]
struct Tables {
    providers: HashMap<Uuid, Provider>,
    users: HashMap<Uuid, User>,
    memberships: HashMap<(Uuid, Uuid), Membership>,
    invitations: HashMap<Uuid, Invitation>,
}

#[derive(Default)]
pub struct MemoryTeamStore {
    tables: Mutex<Tables>,
    fail_next_ops: AtomicU32,
}

impl MemoryTeamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` store calls fail with a transient error.
    pub fn fail_next_ops(&self, n: u32) {
        self.fail_next_ops.store(n, Ordering::SeqCst);
    }

    fn take_failure(&self) -> Result<(), StoreError> {
        if self
            .fail_next_ops
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Unavailable(anyhow::anyhow!(
                "Injected transient failure"
            )));
        }
        Ok(())
    }

    pub async fn seed_provider(&self, name: &str) -> Provider {
        let provider = Provider::new(name.to_string());
        self.tables
            .lock()
            .await
            .providers
            .insert(provider.provider_id, provider.clone());
        provider
    }

    /// Create a user with an active membership, bypassing the invitation
    /// flow.
    pub async fn seed_member(
        &self,
        provider_id: Uuid,
        email: &str,
        role: TeamRole,
    ) -> (User, Membership) {
        let mut tables = self.tables.lock().await;
        let user = find_or_create_user(&mut tables, email, None);
        let membership = Membership::new(provider_id, user.user_id, role, None);
        tables
            .memberships
            .insert((provider_id, user.user_id), membership.clone());
        (user, membership)
    }

}

fn find_or_create_user(tables: &mut Tables, email: &str, display_name: Option<&str>) -> User {
    let normalized = email.to_lowercase();
    let existing = tables
        .users
        .values()
        .find(|u| u.email == normalized)
        .cloned();

    if let Some(mut user) = existing {
        if user.display_name.is_none() && display_name.is_some() {
            user.display_name = display_name.map(str::to_string);
            tables.users.insert(user.user_id, user.clone());
        }
        return user;
    }

    let user = User::new(normalized, display_name.map(str::to_string));
    tables.users.insert(user.user_id, user.clone());
    user
}

#[async_trait]
impl TeamStore for MemoryTeamStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.take_failure()
    }

    async fn find_provider(&self, provider_id: Uuid) -> Result<Option<Provider>, StoreError> {
        self.take_failure()?;
        Ok(self.tables.lock().await.providers.get(&provider_id).cloned())
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        self.take_failure()?;
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.take_failure()?;
        let normalized = email.to_lowercase();
        Ok(self
            .tables
            .lock()
            .await
            .users
            .values()
            .find(|u| u.email == normalized)
            .cloned())
    }

    async fn find_membership(
        &self,
        provider_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, StoreError> {
        self.take_failure()?;
        Ok(self
            .tables
            .lock()
            .await
            .memberships
            .get(&(provider_id, user_id))
            .cloned())
    }

    async fn list_members(&self, provider_id: Uuid) -> Result<Vec<MemberRecord>, StoreError> {
        self.take_failure()?;
        let tables = self.tables.lock().await;
        let mut records: Vec<MemberRecord> = tables
            .memberships
            .values()
            .filter(|m| m.provider_id == provider_id && m.is_active())
            .filter_map(|m| {
                tables.users.get(&m.user_id).map(|u| MemberRecord {
                    membership_id: m.membership_id,
                    provider_id: m.provider_id,
                    user_id: m.user_id,
                    email: u.email.clone(),
                    display_name: u.display_name.clone(),
                    role_code: m.role_code.clone(),
                    status_code: m.status_code.clone(),
                    created_utc: m.created_utc,
                })
            })
            .collect();
        records.sort_by_key(|r| r.created_utc);
        Ok(records)
    }

    async fn find_pending_invitation(
        &self,
        provider_id: Uuid,
        email: &str,
    ) -> Result<Option<Invitation>, StoreError> {
        self.take_failure()?;
        let normalized = email.to_lowercase();
        Ok(self
            .tables
            .lock()
            .await
            .invitations
            .values()
            .find(|i| i.provider_id == provider_id && i.email == normalized && i.is_pending())
            .cloned())
    }

    async fn find_invitation(
        &self,
        provider_id: Uuid,
        invitation_id: Uuid,
    ) -> Result<Option<Invitation>, StoreError> {
        self.take_failure()?;
        Ok(self
            .tables
            .lock()
            .await
            .invitations
            .get(&invitation_id)
            .filter(|i| i.provider_id == provider_id)
            .cloned())
    }

    async fn find_invitation_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invitation>, StoreError> {
        self.take_failure()?;
        Ok(self
            .tables
            .lock()
            .await
            .invitations
            .values()
            .find(|i| i.token_hash == token_hash && !i.is_revoked())
            .cloned())
    }

    async fn list_invitations(&self, provider_id: Uuid) -> Result<Vec<Invitation>, StoreError> {
        self.take_failure()?;
        let mut rows: Vec<Invitation> = self
            .tables
            .lock()
            .await
            .invitations
            .values()
            .filter(|i| i.provider_id == provider_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(rows)
    }

    async fn create_provider_with_owner(
        &self,
        name: &str,
        owner_email: &str,
        owner_display_name: Option<&str>,
    ) -> Result<(Provider, User, Membership), StoreError> {
        self.take_failure()?;
        let mut tables = self.tables.lock().await;

        let provider = Provider::new(name.to_string());
        tables.providers.insert(provider.provider_id, provider.clone());

        let user = find_or_create_user(&mut tables, owner_email, owner_display_name);
        let membership = Membership::new(provider.provider_id, user.user_id, TeamRole::Owner, None);
        tables
            .memberships
            .insert((provider.provider_id, user.user_id), membership.clone());

        Ok((provider, user, membership))
    }

    async fn insert_invitation(
        &self,
        _grant: &AuthzGrant,
        invitation: Invitation,
    ) -> Result<Invitation, StoreError> {
        self.take_failure()?;
        let mut tables = self.tables.lock().await;

        let duplicate = tables.invitations.values().any(|i| {
            i.provider_id == invitation.provider_id && i.email == invitation.email && i.is_pending()
        });
        if duplicate {
            return Err(StoreError::Duplicate);
        }

        tables
            .invitations
            .insert(invitation.invitation_id, invitation.clone());
        Ok(invitation)
    }

    async fn delete_pending_invitation(
        &self,
        grant: &AuthzGrant,
        invitation_id: Uuid,
    ) -> Result<(), StoreError> {
        self.take_failure()?;
        let mut tables = self.tables.lock().await;
        let deletable = tables
            .invitations
            .get(&invitation_id)
            .is_some_and(|i| i.provider_id == grant.provider_id() && i.is_pending());
        if deletable {
            tables.invitations.remove(&invitation_id);
        }
        Ok(())
    }

    async fn rotate_invitation_token(
        &self,
        grant: &AuthzGrant,
        invitation_id: Uuid,
        token_hash: &str,
        expiry_utc: DateTime<Utc>,
    ) -> Result<Invitation, StoreError> {
        self.take_failure()?;
        let mut tables = self.tables.lock().await;
        let invitation = tables
            .invitations
            .get_mut(&invitation_id)
            .filter(|i| i.provider_id == grant.provider_id() && i.is_pending())
            .ok_or(StoreError::NotFound)?;

        invitation.token_hash = token_hash.to_string();
        invitation.expiry_utc = expiry_utc;
        Ok(invitation.clone())
    }

    async fn mark_invitation_revoked(
        &self,
        grant: &AuthzGrant,
        invitation_id: Uuid,
    ) -> Result<Invitation, StoreError> {
        self.take_failure()?;
        let mut tables = self.tables.lock().await;
        let invitation = tables
            .invitations
            .get_mut(&invitation_id)
            .filter(|i| i.provider_id == grant.provider_id() && i.is_pending())
            .ok_or(StoreError::NotFound)?;

        invitation.state_code = crate::models::InvitationState::Revoked.as_str().to_string();
        Ok(invitation.clone())
    }

    async fn update_membership_role(
        &self,
        grant: &AuthzGrant,
        user_id: Uuid,
        role: TeamRole,
    ) -> Result<Membership, StoreError> {
        self.take_failure()?;
        let mut tables = self.tables.lock().await;
        let membership = tables
            .memberships
            .get_mut(&(grant.provider_id(), user_id))
            .filter(|m| m.is_active())
            .ok_or(StoreError::NotFound)?;

        membership.role_code = role.as_str().to_string();
        membership.updated_utc = Utc::now();
        Ok(membership.clone())
    }

    async fn remove_membership(
        &self,
        grant: &AuthzGrant,
        user_id: Uuid,
    ) -> Result<Membership, StoreError> {
        self.take_failure()?;
        let mut tables = self.tables.lock().await;
        let membership = tables
            .memberships
            .get_mut(&(grant.provider_id(), user_id))
            .filter(|m| m.is_active())
            .ok_or(StoreError::NotFound)?;

        membership.status_code = MembershipStatus::Removed.as_str().to_string();
        membership.updated_utc = Utc::now();
        Ok(membership.clone())
    }

    async fn accept_invitation(
        &self,
        token_hash: &str,
        display_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(Invitation, Membership), StoreError> {
        self.take_failure()?;
        let mut tables = self.tables.lock().await;

        let invitation = tables
            .invitations
            .values()
            .find(|i| i.token_hash == token_hash && !i.is_revoked())
            .cloned()
            .ok_or(StoreError::NotFound)?;

        if invitation.is_accepted() {
            return Err(StoreError::AlreadyAccepted);
        }
        if invitation.is_expired_at(now) {
            return Err(StoreError::Expired);
        }

        let mut accepted = invitation;
        accepted.state_code = crate::models::InvitationState::Accepted.as_str().to_string();
        accepted.accepted_utc = Some(now);
        tables
            .invitations
            .insert(accepted.invitation_id, accepted.clone());

        let user = find_or_create_user(&mut tables, &accepted.email, display_name);

        let key = (accepted.provider_id, user.user_id);
        let membership = match tables.memberships.get_mut(&key) {
            Some(existing) => {
                // An active owner keeps the owner role; everyone else takes
                // the invited role.
                let keep_owner =
                    existing.is_active() && existing.role_code == TeamRole::Owner.as_str();
                if !keep_owner {
                    existing.role_code = accepted.role_code.clone();
                }
                existing.status_code = MembershipStatus::Active.as_str().to_string();
                existing.updated_utc = now;
                existing.clone()
            }
            None => {
                let membership = Membership::new(
                    accepted.provider_id,
                    user.user_id,
                    accepted
                        .role()
                        .map_err(|e| StoreError::Internal(anyhow::Error::new(e)))?,
                    Some(accepted.invited_by),
                );
                tables.memberships.insert(key, membership.clone());
                membership
            }
        };

        Ok((accepted, membership))
    }
}
