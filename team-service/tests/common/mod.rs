//! Shared harness for team-service integration tests.
//!
//! Builds the full router over the in-memory store with mock mail and
//! audit sinks, so tests drive real HTTP requests without Postgres or
//! an SMTP relay.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use chrono::Utc;
use serde_json::Value;
use service_core::middleware::create_ip_rate_limiter;
use team_service::{
    AppState, build_router,
    config::{
        DatabaseConfig, InviteConfig, RateLimitConfig, SecurityConfig, SmtpConfig, TeamConfig,
    },
    db::MemoryTeamStore,
    models::{Provider, TeamRole, User},
    services::{
        AuditRecorder, Authorizer, InviteRateLimiter, ManualClock, MemoryAuditSink,
        MockNotificationSender, TeamService,
    },
};
use tower::util::ServiceExt;
use uuid::Uuid;

/// Everything a test needs to drive the service and inspect its side
/// effects.
pub struct TestApp {
    pub router: Router,
    pub team: TeamService,
    pub store: Arc<MemoryTeamStore>,
    pub notifier: Arc<MockNotificationSender>,
    pub audit_sink: Arc<MemoryAuditSink>,
    pub clock: Arc<ManualClock>,
}

/// Provider with an owner and an admin, the usual starting roster.
pub struct SeededTeam {
    pub provider: Provider,
    pub owner: User,
    pub admin: User,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_inner(10, 86_400, 1000, 60).await
    }

    /// Build the app with a custom invitation quota so limit tests can
    /// trip it quickly.
    pub async fn spawn_with_invite_limit(max_attempts: u32, window_seconds: i64) -> Self {
        Self::spawn_inner(max_attempts, window_seconds, 1000, 60).await
    }

    /// Build the app with a tight IP budget on the public endpoints.
    pub async fn spawn_with_accept_ip_limit(limit: u32, window_seconds: u64) -> Self {
        Self::spawn_inner(10, 86_400, limit, window_seconds).await
    }

    async fn spawn_inner(
        max_attempts: u32,
        window_seconds: i64,
        accept_ip_limit: u32,
        accept_ip_window_seconds: u64,
    ) -> Self {
        let store = Arc::new(MemoryTeamStore::new());
        let notifier = Arc::new(MockNotificationSender::new());
        let audit_sink = Arc::new(MemoryAuditSink::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let mut config = test_config();
        config.invite.max_attempts = max_attempts;
        config.invite.window_seconds = window_seconds;
        config.rate_limit.accept_ip_limit = accept_ip_limit;
        config.rate_limit.accept_ip_window_seconds = accept_ip_window_seconds;

        let limiter = Arc::new(InviteRateLimiter::new(
            max_attempts,
            window_seconds,
            clock.clone(),
        ));

        let team = TeamService::new(
            store.clone(),
            Authorizer::new(store.clone()),
            limiter,
            notifier.clone(),
            AuditRecorder::new(audit_sink.clone()),
            clock.clone(),
            config.invite.expiry_hours,
        );

        let accept_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.accept_ip_limit,
            config.rate_limit.accept_ip_window_seconds,
        );

        let state = AppState {
            config,
            team: team.clone(),
            accept_rate_limiter,
        };
        let router = build_router(state).await.expect("Failed to build router");

        Self {
            router,
            team,
            store,
            notifier,
            audit_sink,
            clock,
        }
    }

    pub async fn seed_team(&self) -> SeededTeam {
        let provider = self.store.seed_provider("Seasonal Table Catering").await;
        let (owner, _) = self
            .store
            .seed_member(provider.provider_id, "owner@example.com", TeamRole::Owner)
            .await;
        let (admin, _) = self
            .store
            .seed_member(provider.provider_id, "admin@example.com", TeamRole::Admin)
            .await;

        SeededTeam {
            provider,
            owner,
            admin,
        }
    }

    /// Issue an invitation over HTTP, asserting success, and return the
    /// invitation id plus the raw token captured from the outgoing mail.
    pub async fn issue_invitation(
        &self,
        provider_id: Uuid,
        actor_id: Uuid,
        email: &str,
        role: &str,
    ) -> (Uuid, String) {
        let response = self
            .router
            .clone()
            .oneshot(authed_request(
                "POST",
                &format!("/providers/{}/invitations", provider_id),
                actor_id,
                serde_json::json!({ "email": email, "role": role }),
            ))
            .await
            .expect("Request failed");
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response_json(response).await;
        let invitation_id: Uuid = body["invitation_id"]
            .as_str()
            .expect("Response carried no invitation_id")
            .parse()
            .expect("invitation_id was not a UUID");
        let token = self
            .notifier
            .sent()
            .await
            .last()
            .expect("No invitation email captured")
            .invite_token
            .clone();

        (invitation_id, token)
    }
}

/// Config for tests. Built directly instead of via `from_env` so test
/// runs never depend on ambient environment variables.
pub fn test_config() -> TeamConfig {
    TeamConfig {
        common: service_core::config::Config { port: 8080 },
        environment: service_core::config::Environment::Dev,
        service_name: "team-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        public_base_url: "http://localhost:3000".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 587,
            user: String::new(),
            password: String::new(),
            from_email: "noreply@example.com".to_string(),
            from_name: "Team Service".to_string(),
            enabled: false,
        },
        invite: InviteConfig {
            expiry_hours: 48,
            max_attempts: 10,
            window_seconds: 86_400,
        },
        rate_limit: RateLimitConfig {
            accept_ip_limit: 1000,
            accept_ip_window_seconds: 60,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
    }
}

/// JSON request carrying the gateway's actor header.
pub fn authed_request(method: &str, uri: &str, actor_id: Uuid, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-actor-id", actor_id.to_string())
        .body(Body::from(body.to_string()))
        .expect("Failed to build request")
}

/// Bodyless request with the actor header, for DELETE and resend.
pub fn authed_empty(method: &str, uri: &str, actor_id: Uuid) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-actor-id", actor_id.to_string())
        .body(Body::empty())
        .expect("Failed to build request")
}

pub fn authed_get(uri: &str, actor_id: Uuid) -> Request<Body> {
    authed_empty("GET", uri, actor_id)
}

/// JSON request without the actor header, for the public endpoints.
pub fn public_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("Failed to build request")
}

pub fn public_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("Failed to build request")
}

pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    serde_json::from_slice(&bytes).expect("Response body was not JSON")
}
