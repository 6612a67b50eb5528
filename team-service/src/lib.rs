pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post},
};
use service_core::error::AppError;
use service_core::middleware::{
    IpRateLimiter, ip_rate_limit_middleware, request_id_middleware, security_headers_middleware,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::TeamConfig;
use crate::services::TeamService;

#[derive(Clone)]
pub struct AppState {
    pub config: TeamConfig,
    pub team: TeamService,
    pub accept_rate_limiter: IpRateLimiter,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Accept and preview carry no actor header; they get their own IP budget
    // instead.
    let accept_limiter = state.accept_rate_limiter.clone();
    let public_routes = Router::new()
        .route("/invitations/accept", post(handlers::accept_invitation))
        .route("/invitations/:token", get(handlers::preview_invitation))
        .layer(from_fn_with_state(accept_limiter, ip_rate_limit_middleware));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/providers", post(handlers::provision_provider))
        .route(
            "/providers/:provider_id/invitations",
            post(handlers::issue_invitation).get(handlers::list_invitations),
        )
        .route(
            "/providers/:provider_id/invitations/:invitation_id",
            delete(handlers::revoke_invitation),
        )
        .route(
            "/providers/:provider_id/invitations/:invitation_id/resend",
            post(handlers::resend_invitation),
        )
        .route(
            "/providers/:provider_id/members",
            get(handlers::list_members),
        )
        .route(
            "/providers/:provider_id/members/:user_id",
            patch(handlers::change_member_role).delete(handlers::remove_member),
        )
        .route(
            "/providers/:provider_id/audit-events",
            get(handlers::list_audit_events),
        )
        .merge(public_routes)
        .with_state(state.clone())
        // Add tracing layer
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        // Add security headers middleware
        .layer(from_fn(security_headers_middleware))
        // Add CORS layer
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .map(|o| {
                            o.parse::<HeaderValue>().unwrap_or_else(|e| {
                                tracing::error!(
                                    "Invalid CORS origin '{}': {}. Using fallback.",
                                    o,
                                    e
                                );
                                HeaderValue::from_static("*")
                            })
                        })
                        .collect::<Vec<HeaderValue>>(),
                )
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::HeaderName::from_static("x-actor-id"),
                ]),
        );

    Ok(app)
}

/// Service health check
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.team.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "database": "up"
        }
    })))
}
