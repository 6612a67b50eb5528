use std::net::SocketAddr;
use std::sync::Arc;

use service_core::middleware::create_ip_rate_limiter;
use service_core::observability::init_tracing;
use team_service::config::TeamConfig;
use team_service::db::{self, PgTeamStore, TeamStore};
use team_service::services::{
    AuditRecorder, Authorizer, EmailNotifier, InviteRateLimiter, MockNotificationSender,
    NotificationSender, PgAuditSink, SystemClock, TeamService,
};
use team_service::{AppState, build_router};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = TeamConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting team service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let store: Arc<dyn TeamStore> = Arc::new(PgTeamStore::new(pool.clone()));
    let audit = AuditRecorder::new(Arc::new(PgAuditSink::new(pool)));

    let notifier: Arc<dyn NotificationSender> = if config.smtp.enabled {
        Arc::new(EmailNotifier::new(
            config.smtp.clone(),
            config.public_base_url.clone(),
        )?)
    } else {
        tracing::warn!("SMTP disabled, invitation emails will only be logged");
        Arc::new(MockNotificationSender::new())
    };

    let clock = Arc::new(SystemClock);
    let invite_limiter = Arc::new(InviteRateLimiter::new(
        config.invite.max_attempts,
        config.invite.window_seconds,
        clock.clone(),
    ));

    let team = TeamService::new(
        store.clone(),
        Authorizer::new(store.clone()),
        invite_limiter,
        notifier,
        audit,
        clock,
        config.invite.expiry_hours,
    );

    let accept_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.accept_ip_limit,
        config.rate_limit.accept_ip_window_seconds,
    );

    let state = AppState {
        config: config.clone(),
        team,
        accept_rate_limiter,
    };

    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
