//! PostgreSQL-backed team store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::store::{StoreError, TeamStore, map_db_err};
use crate::models::{
    Invitation, InvitationState, MemberRecord, Membership, Provider, TeamRole, User,
};
use crate::services::authz::AuthzGrant;

#[derive(Clone)]
pub struct PgTeamStore {
    pool: PgPool,
}

impl PgTeamStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Find a user by email inside a transaction, creating it when absent.
/// A provided display name fills in a missing one but never overwrites.
async fn find_or_create_user(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    email: &str,
    display_name: Option<&str>,
) -> Result<User, StoreError> {
    let existing = sqlx::query_as::<_, User>(
        r#"
        SELECT user_id, email, display_name, created_utc
        FROM users
        WHERE email = LOWER($1)
        "#,
    )
    .bind(email)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_db_err("Failed to look up user", e))?;

    match existing {
        Some(user) if user.display_name.is_none() && display_name.is_some() => {
            sqlx::query_as::<_, User>(
                r#"
                UPDATE users SET display_name = $2
                WHERE user_id = $1
                RETURNING user_id, email, display_name, created_utc
                "#,
            )
            .bind(user.user_id)
            .bind(display_name)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_db_err("Failed to update user display name", e))
        }
        Some(user) => Ok(user),
        None => {
            sqlx::query_as::<_, User>(
                r#"
                INSERT INTO users (user_id, email, display_name)
                VALUES ($1, LOWER($2), $3)
                RETURNING user_id, email, display_name, created_utc
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(email)
            .bind(display_name)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_db_err("Failed to create user", e))
        }
    }
}

#[async_trait]
impl TeamStore for PgTeamStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_err("Health check failed", e))?;
        Ok(())
    }

    async fn find_provider(&self, provider_id: Uuid) -> Result<Option<Provider>, StoreError> {
        sqlx::query_as::<_, Provider>(
            r#"
            SELECT provider_id, display_name, created_utc
            FROM providers
            WHERE provider_id = $1
            "#,
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to get provider", e))
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, email, display_name, created_utc
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to get user", e))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, email, display_name, created_utc
            FROM users
            WHERE email = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to get user by email", e))
    }

    async fn find_membership(
        &self,
        provider_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, StoreError> {
        sqlx::query_as::<_, Membership>(
            r#"
            SELECT membership_id, provider_id, user_id, role_code, status_code, invited_by, created_utc, updated_utc
            FROM memberships
            WHERE provider_id = $1 AND user_id = $2
            "#,
        )
        .bind(provider_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to get membership", e))
    }

    async fn list_members(&self, provider_id: Uuid) -> Result<Vec<MemberRecord>, StoreError> {
        sqlx::query_as::<_, MemberRecord>(
            r#"
            SELECT m.membership_id, m.provider_id, m.user_id, u.email, u.display_name,
                   m.role_code, m.status_code, m.created_utc
            FROM memberships m
            JOIN users u ON u.user_id = m.user_id
            WHERE m.provider_id = $1 AND m.status_code = 'active'
            ORDER BY m.created_utc
            "#,
        )
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to list members", e))
    }

    async fn find_pending_invitation(
        &self,
        provider_id: Uuid,
        email: &str,
    ) -> Result<Option<Invitation>, StoreError> {
        sqlx::query_as::<_, Invitation>(
            r#"
            SELECT invitation_id, provider_id, email, role_code, token_hash, state_code, expiry_utc, accepted_utc, invited_by, created_utc
            FROM invitations
            WHERE provider_id = $1 AND email = LOWER($2) AND state_code = 'pending'
            "#,
        )
        .bind(provider_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to get pending invitation", e))
    }

    async fn find_invitation(
        &self,
        provider_id: Uuid,
        invitation_id: Uuid,
    ) -> Result<Option<Invitation>, StoreError> {
        sqlx::query_as::<_, Invitation>(
            r#"
            SELECT invitation_id, provider_id, email, role_code, token_hash, state_code, expiry_utc, accepted_utc, invited_by, created_utc
            FROM invitations
            WHERE provider_id = $1 AND invitation_id = $2
            "#,
        )
        .bind(provider_id)
        .bind(invitation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to get invitation", e))
    }

    async fn find_invitation_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invitation>, StoreError> {
        sqlx::query_as::<_, Invitation>(
            r#"
            SELECT invitation_id, provider_id, email, role_code, token_hash, state_code, expiry_utc, accepted_utc, invited_by, created_utc
            FROM invitations
            WHERE token_hash = $1 AND state_code <> 'revoked'
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to get invitation by token", e))
    }

    async fn list_invitations(&self, provider_id: Uuid) -> Result<Vec<Invitation>, StoreError> {
        sqlx::query_as::<_, Invitation>(
            r#"
            SELECT invitation_id, provider_id, email, role_code, token_hash, state_code, expiry_utc, accepted_utc, invited_by, created_utc
            FROM invitations
            WHERE provider_id = $1
            ORDER BY created_utc DESC
            "#,
        )
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to list invitations", e))
    }

    #[instrument(skip(self, owner_email, owner_display_name))]
    async fn create_provider_with_owner(
        &self,
        name: &str,
        owner_email: &str,
        owner_display_name: Option<&str>,
    ) -> Result<(Provider, User, Membership), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_err("Failed to begin transaction", e))?;

        let provider = sqlx::query_as::<_, Provider>(
            r#"
            INSERT INTO providers (provider_id, display_name)
            VALUES ($1, $2)
            RETURNING provider_id, display_name, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_err("Failed to create provider", e))?;

        let user = find_or_create_user(&mut tx, owner_email, owner_display_name).await?;

        let membership = sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO memberships (membership_id, provider_id, user_id, role_code, status_code)
            VALUES ($1, $2, $3, 'owner', 'active')
            RETURNING membership_id, provider_id, user_id, role_code, status_code, invited_by, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(provider.provider_id)
        .bind(user.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_err("Failed to create owner membership", e))?;

        tx.commit()
            .await
            .map_err(|e| map_db_err("Failed to commit provisioning", e))?;

        info!(
            provider_id = %provider.provider_id,
            owner_user_id = %user.user_id,
            "Provider provisioned"
        );

        Ok((provider, user, membership))
    }

    #[instrument(skip_all, fields(provider_id = %grant.provider_id(), invitation_id = %invitation.invitation_id))]
    async fn insert_invitation(
        &self,
        grant: &AuthzGrant,
        invitation: Invitation,
    ) -> Result<Invitation, StoreError> {
        sqlx::query_as::<_, Invitation>(
            r#"
            INSERT INTO invitations (invitation_id, provider_id, email, role_code, token_hash, state_code, expiry_utc, accepted_utc, invited_by, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING invitation_id, provider_id, email, role_code, token_hash, state_code, expiry_utc, accepted_utc, invited_by, created_utc
            "#,
        )
        .bind(invitation.invitation_id)
        .bind(grant.provider_id())
        .bind(&invitation.email)
        .bind(&invitation.role_code)
        .bind(&invitation.token_hash)
        .bind(&invitation.state_code)
        .bind(invitation.expiry_utc)
        .bind(invitation.accepted_utc)
        .bind(invitation.invited_by)
        .bind(invitation.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to insert invitation", e))
    }

    async fn delete_pending_invitation(
        &self,
        grant: &AuthzGrant,
        invitation_id: Uuid,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            DELETE FROM invitations
            WHERE invitation_id = $1 AND provider_id = $2 AND state_code = 'pending'
            "#,
        )
        .bind(invitation_id)
        .bind(grant.provider_id())
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to delete invitation", e))?;
        Ok(())
    }

    #[instrument(skip_all, fields(provider_id = %grant.provider_id(), invitation_id = %invitation_id))]
    async fn rotate_invitation_token(
        &self,
        grant: &AuthzGrant,
        invitation_id: Uuid,
        token_hash: &str,
        expiry_utc: DateTime<Utc>,
    ) -> Result<Invitation, StoreError> {
        sqlx::query_as::<_, Invitation>(
            r#"
            UPDATE invitations SET token_hash = $3, expiry_utc = $4
            WHERE invitation_id = $1 AND provider_id = $2 AND state_code = 'pending'
            RETURNING invitation_id, provider_id, email, role_code, token_hash, state_code, expiry_utc, accepted_utc, invited_by, created_utc
            "#,
        )
        .bind(invitation_id)
        .bind(grant.provider_id())
        .bind(token_hash)
        .bind(expiry_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to rotate invitation token", e))
    }

    #[instrument(skip_all, fields(provider_id = %grant.provider_id(), invitation_id = %invitation_id))]
    async fn mark_invitation_revoked(
        &self,
        grant: &AuthzGrant,
        invitation_id: Uuid,
    ) -> Result<Invitation, StoreError> {
        sqlx::query_as::<_, Invitation>(
            r#"
            UPDATE invitations SET state_code = 'revoked'
            WHERE invitation_id = $1 AND provider_id = $2 AND state_code = 'pending'
            RETURNING invitation_id, provider_id, email, role_code, token_hash, state_code, expiry_utc, accepted_utc, invited_by, created_utc
            "#,
        )
        .bind(invitation_id)
        .bind(grant.provider_id())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to revoke invitation", e))
    }

    #[instrument(skip_all, fields(provider_id = %grant.provider_id(), user_id = %user_id, role = %role))]
    async fn update_membership_role(
        &self,
        grant: &AuthzGrant,
        user_id: Uuid,
        role: TeamRole,
    ) -> Result<Membership, StoreError> {
        sqlx::query_as::<_, Membership>(
            r#"
            UPDATE memberships SET role_code = $3, updated_utc = NOW()
            WHERE provider_id = $1 AND user_id = $2 AND status_code = 'active'
            RETURNING membership_id, provider_id, user_id, role_code, status_code, invited_by, created_utc, updated_utc
            "#,
        )
        .bind(grant.provider_id())
        .bind(user_id)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to update membership role", e))
    }

    #[instrument(skip_all, fields(provider_id = %grant.provider_id(), user_id = %user_id))]
    async fn remove_membership(
        &self,
        grant: &AuthzGrant,
        user_id: Uuid,
    ) -> Result<Membership, StoreError> {
        sqlx::query_as::<_, Membership>(
            r#"
            UPDATE memberships SET status_code = 'removed', updated_utc = NOW()
            WHERE provider_id = $1 AND user_id = $2 AND status_code = 'active'
            RETURNING membership_id, provider_id, user_id, role_code, status_code, invited_by, created_utc, updated_utc
            "#,
        )
        .bind(grant.provider_id())
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to remove membership", e))
    }

    #[instrument(skip_all)]
    async fn accept_invitation(
        &self,
        token_hash: &str,
        display_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(Invitation, Membership), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_err("Failed to begin transaction", e))?;

        // Lock the row so two accepts of the same token serialize; the
        // loser then sees state_code = 'accepted'.
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            SELECT invitation_id, provider_id, email, role_code, token_hash, state_code, expiry_utc, accepted_utc, invited_by, created_utc
            FROM invitations
            WHERE token_hash = $1 AND state_code <> 'revoked'
            FOR UPDATE
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_db_err("Failed to load invitation", e))?
        .ok_or(StoreError::NotFound)?;

        if invitation.is_accepted() {
            return Err(StoreError::AlreadyAccepted);
        }
        if invitation.is_expired_at(now) {
            return Err(StoreError::Expired);
        }

        let accepted = sqlx::query_as::<_, Invitation>(
            r#"
            UPDATE invitations SET state_code = $2, accepted_utc = NOW()
            WHERE invitation_id = $1
            RETURNING invitation_id, provider_id, email, role_code, token_hash, state_code, expiry_utc, accepted_utc, invited_by, created_utc
            "#,
        )
        .bind(invitation.invitation_id)
        .bind(InvitationState::Accepted.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_err("Failed to mark invitation accepted", e))?;

        let user = find_or_create_user(&mut tx, &accepted.email, display_name).await?;

        // An active owner keeps the owner role; everyone else takes the
        // invited role.
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO memberships (membership_id, provider_id, user_id, role_code, status_code, invited_by)
            VALUES ($1, $2, $3, $4, 'active', $5)
            ON CONFLICT (provider_id, user_id) DO UPDATE
            SET role_code = CASE
                    WHEN memberships.status_code = 'active' AND memberships.role_code = 'owner'
                    THEN memberships.role_code
                    ELSE EXCLUDED.role_code
                END,
                status_code = 'active',
                updated_utc = NOW()
            RETURNING membership_id, provider_id, user_id, role_code, status_code, invited_by, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(accepted.provider_id)
        .bind(user.user_id)
        .bind(&accepted.role_code)
        .bind(accepted.invited_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_err("Failed to upsert membership", e))?;

        tx.commit()
            .await
            .map_err(|e| map_db_err("Failed to commit acceptance", e))?;

        info!(
            invitation_id = %accepted.invitation_id,
            provider_id = %accepted.provider_id,
            user_id = %user.user_id,
            "Invitation accepted"
        );

        Ok((accepted, membership))
    }
}
