//! Persistence layer: connection pool, migrations and store implementations.

pub mod memory;
pub mod postgres;
pub mod store;

pub use memory::MemoryTeamStore;
pub use postgres::PgTeamStore;
pub use store::{StoreError, TeamStore};

use std::time::Duration;

use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};

use crate::config::DatabaseConfig;

/// Create the PostgreSQL connection pool.
#[instrument(skip(config), fields(service = "team-service"))]
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, AppError> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Connecting to PostgreSQL"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(&config.url)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

    info!("PostgreSQL connection pool established");

    Ok(pool)
}

/// Apply pending database migrations.
#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    info!("Running database migrations");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
    info!("Database migrations completed");
    Ok(())
}
