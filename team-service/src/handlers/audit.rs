//! Audit trail handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::middleware::ActorIdentity;
use crate::models::AuditEventResponse;
use crate::services::AuditQuery;
use service_core::error::AppError;

/// Query params for listing audit events.
#[derive(Debug, Deserialize)]
pub struct ListAuditEventsQuery {
    pub actor_user_id: Option<Uuid>,
    pub action_code: Option<String>,
    pub target_id: Option<Uuid>,
    pub from_utc: Option<DateTime<Utc>>,
    pub to_utc: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

/// Paginated audit events response.
#[derive(Debug, Serialize)]
pub struct AuditEventsResponse {
    pub events: Vec<AuditEventResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// List a provider's audit events with filtering and pagination.
///
/// GET /providers/:provider_id/audit-events
#[tracing::instrument(
    skip_all,
    fields(
        provider_id = %provider_id,
        action_code = ?query.action_code,
        limit = query.limit,
        offset = query.offset
    )
)]
pub async fn list_audit_events(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
    actor: ActorIdentity,
    Query(query): Query<ListAuditEventsQuery>,
) -> Result<Json<AuditEventsResponse>, AppError> {
    let limit = query.limit.clamp(1, 1000);
    let offset = query.offset.max(0);

    let (events, total) = state
        .team
        .list_audit_events(
            provider_id,
            actor.user_id,
            AuditQuery {
                actor_user_id: query.actor_user_id,
                action_code: query.action_code,
                target_id: query.target_id,
                from_utc: query.from_utc,
                to_utc: query.to_utc,
                limit,
                offset,
            },
        )
        .await?;

    Ok(Json(AuditEventsResponse {
        events,
        total,
        limit,
        offset,
    }))
}
