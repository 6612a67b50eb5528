use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::RequestOrigin;

/// Header carrying the authenticated user id, set by the platform gateway.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

/// Authenticated caller identity.
///
/// The gateway authenticates the session and forwards the user id in
/// `x-actor-id`. This service trusts that header and answers the separate
/// question of what the user may do inside a provider's team; requests
/// that bypass the gateway never reach this service.
#[derive(Debug, Clone, Copy)]
pub struct ActorIdentity {
    pub user_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACTOR_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing {} header", ACTOR_ID_HEADER))
            })?;

        let user_id = Uuid::parse_str(raw).map_err(|_| {
            AppError::Unauthorized(anyhow::anyhow!("Invalid {} header", ACTOR_ID_HEADER))
        })?;

        // Add to tracing span for observability
        tracing::Span::current().record("actor_id", raw);

        Ok(ActorIdentity { user_id })
    }
}

/// Best-effort request origin for audit rows. Never rejects.
#[async_trait]
impl<S> FromRequestParts<S> for RequestOrigin
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip_address = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string());

        let user_agent = parts
            .headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        Ok(RequestOrigin {
            ip_address,
            user_agent,
        })
    }
}
