//! Outcome taxonomy for team-management operations.
//!
//! Handlers convert these into HTTP responses through the
//! `From<ServiceError> for AppError` impl, so the status mapping lives in
//! exactly one place.

use service_core::error::AppError;
use thiserror::Error;

use crate::db::store::StoreError;
use crate::models::role::UnknownRoleError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Actor has no active membership or an insufficient role.
    #[error("Insufficient permissions for this action")]
    Forbidden,

    /// Invitation budget for the current window is spent.
    #[error("Invitation rate limit exceeded")]
    RateLimited { retry_after_seconds: u64 },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invitation has expired")]
    Expired,

    #[error("Invitation has already been accepted")]
    AlreadyAccepted,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServiceError::NotFound("Record not found".to_string()),
            StoreError::Duplicate => {
                ServiceError::Conflict("A conflicting record already exists".to_string())
            }
            StoreError::Expired => ServiceError::Expired,
            StoreError::AlreadyAccepted => ServiceError::AlreadyAccepted,
            StoreError::Unavailable(e) | StoreError::Internal(e) => ServiceError::Internal(e),
        }
    }
}

impl From<UnknownRoleError> for ServiceError {
    fn from(err: UnknownRoleError) -> Self {
        ServiceError::Internal(anyhow::Error::new(err))
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Forbidden => {
                AppError::Forbidden(anyhow::anyhow!("Insufficient permissions for this action"))
            }
            ServiceError::RateLimited {
                retry_after_seconds,
            } => AppError::TooManyRequests(
                "Invitation rate limit exceeded".to_string(),
                Some(retry_after_seconds),
            ),
            ServiceError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            ServiceError::InvalidInput(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            ServiceError::Expired => AppError::Gone(anyhow::anyhow!("Invitation has expired")),
            ServiceError::AlreadyAccepted => {
                AppError::Conflict(anyhow::anyhow!("Invitation has already been accepted"))
            }
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
