//! Persistence seam for team data.
//!
//! Handlers and services talk to [`TeamStore`] rather than a concrete
//! database, so the whole service can run against [`PgTeamStore`] in
//! production and [`MemoryTeamStore`] in tests.
//!
//! [`PgTeamStore`]: crate::db::postgres::PgTeamStore
//! [`MemoryTeamStore`]: crate::db::memory::MemoryTeamStore

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Invitation, MemberRecord, Membership, Provider, TeamRole, User};
use crate::services::authz::AuthzGrant;

/// Failures a store can report. `Unavailable` marks outages worth one
/// retry; everything else is terminal for the current operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("A conflicting record already exists")]
    Duplicate,

    #[error("Invitation has expired")]
    Expired,

    #[error("Invitation has already been accepted")]
    AlreadyAccepted,

    #[error("Persistence temporarily unavailable: {0}")]
    Unavailable(anyhow::Error),

    #[error("Persistence failure: {0}")]
    Internal(anyhow::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Map a sqlx error onto the store taxonomy.
pub(crate) fn map_db_err(context: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => StoreError::Duplicate,
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StoreError::Unavailable(anyhow::anyhow!("{}: {}", context, err))
        }
        _ => StoreError::Internal(anyhow::anyhow!("{}: {}", context, err)),
    }
}

const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Run a store call, retrying exactly once after a short pause when it
/// fails with a transient error.
pub(crate) async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    match op().await {
        Err(e) if e.is_transient() => {
            tracing::warn!(error = %e, "Transient persistence failure, retrying once");
            tokio::time::sleep(RETRY_BACKOFF).await;
            op().await
        }
        other => other,
    }
}

/// Storage operations for providers, users, memberships and invitations.
///
/// Methods that change provider-scoped state take an [`AuthzGrant`], which
/// can only be minted by [`Authorizer::authorize`]. A caller holding one
/// has already passed the active-membership and role checks for the
/// provider the grant names. [`accept_invitation`] is the deliberate
/// exception: possession of a valid invite token is its authorization.
///
/// [`Authorizer::authorize`]: crate::services::authz::Authorizer::authorize
/// [`accept_invitation`]: TeamStore::accept_invitation
#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;

    // Reads.
    async fn find_provider(&self, provider_id: Uuid) -> Result<Option<Provider>, StoreError>;

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Look up a membership in any status. Callers decide whether a
    /// removed row counts.
    async fn find_membership(
        &self,
        provider_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, StoreError>;

    /// Active members of a provider joined with their user records.
    async fn list_members(&self, provider_id: Uuid) -> Result<Vec<MemberRecord>, StoreError>;

    /// The pending invitation for this provider and email, expired or not.
    /// At most one such row exists at a time.
    async fn find_pending_invitation(
        &self,
        provider_id: Uuid,
        email: &str,
    ) -> Result<Option<Invitation>, StoreError>;

    async fn find_invitation(
        &self,
        provider_id: Uuid,
        invitation_id: Uuid,
    ) -> Result<Option<Invitation>, StoreError>;

    /// Token lookup for acceptance and preview. Revoked invitations are
    /// invisible here.
    async fn find_invitation_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invitation>, StoreError>;

    async fn list_invitations(&self, provider_id: Uuid) -> Result<Vec<Invitation>, StoreError>;

    // Provisioning.

    /// Create a provider together with its owner user and owner
    /// membership in one transaction.
    async fn create_provider_with_owner(
        &self,
        name: &str,
        owner_email: &str,
        owner_display_name: Option<&str>,
    ) -> Result<(Provider, User, Membership), StoreError>;

    // Writes that require an authorization grant.

    /// Insert a new pending invitation. Fails with [`StoreError::Duplicate`]
    /// when a pending invitation for the same provider and email already
    /// exists.
    async fn insert_invitation(
        &self,
        grant: &AuthzGrant,
        invitation: Invitation,
    ) -> Result<Invitation, StoreError>;

    /// Delete a pending invitation, typically to supersede an expired one.
    /// Deleting a row that is gone or no longer pending is not an error.
    async fn delete_pending_invitation(
        &self,
        grant: &AuthzGrant,
        invitation_id: Uuid,
    ) -> Result<(), StoreError>;

    /// Replace the token and expiry of a pending invitation. Fails with
    /// [`StoreError::NotFound`] when the row is gone or no longer pending.
    async fn rotate_invitation_token(
        &self,
        grant: &AuthzGrant,
        invitation_id: Uuid,
        token_hash: &str,
        expiry_utc: DateTime<Utc>,
    ) -> Result<Invitation, StoreError>;

    /// Move a pending invitation to the revoked state. Fails with
    /// [`StoreError::NotFound`] when the row is gone or no longer pending.
    async fn mark_invitation_revoked(
        &self,
        grant: &AuthzGrant,
        invitation_id: Uuid,
    ) -> Result<Invitation, StoreError>;

    /// Change the role of an active membership.
    async fn update_membership_role(
        &self,
        grant: &AuthzGrant,
        user_id: Uuid,
        role: TeamRole,
    ) -> Result<Membership, StoreError>;

    /// Mark an active membership as removed.
    async fn remove_membership(
        &self,
        grant: &AuthzGrant,
        user_id: Uuid,
    ) -> Result<Membership, StoreError>;

    // Token-authorized write.

    /// Accept the invitation behind `token_hash`: mark it accepted, find
    /// or create the invited user and upsert their membership, all in one
    /// transaction. Expiry is judged against the caller's `now` so the
    /// whole flow runs on one clock.
    async fn accept_invitation(
        &self,
        token_hash: &str,
        display_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(Invitation, Membership), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn with_retry_retries_transient_failures_once() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(StoreError::Unavailable(anyhow::anyhow!("blip")))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn with_retry_gives_up_after_the_second_transient_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Unavailable(anyhow::anyhow!("still down"))) }
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn with_retry_does_not_retry_terminal_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Duplicate) }
        })
        .await;

        assert!(matches!(result.unwrap_err(), StoreError::Duplicate));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
