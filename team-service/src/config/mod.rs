use serde::Deserialize;
use service_core::config as core_config;
use service_core::config::{Environment, get_env};
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct TeamConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// Base URL of the public frontend, used to build invitation links.
    pub public_base_url: String,
    pub database: DatabaseConfig,
    pub smtp: SmtpConfig,
    pub invite: InviteConfig,
    pub rate_limit: RateLimitConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InviteConfig {
    pub expiry_hours: i64,
    pub max_attempts: u32,
    pub window_seconds: i64,
}

/// IP limits for the unauthenticated accept and preview endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub accept_ip_limit: u32,
    pub accept_ip_window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

impl TeamConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let environment = Environment::from_env()?;
        let is_prod = environment.is_prod();

        let config = TeamConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("team-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            public_base_url: get_env(
                "PUBLIC_BASE_URL",
                Some("http://localhost:3000"),
                is_prod,
            )?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: get_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?
                    .parse()
                    .unwrap_or(10),
                min_connections: get_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?
                    .parse()
                    .unwrap_or(1),
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                port: get_env("SMTP_PORT", Some("587"), is_prod)?
                    .parse()
                    .unwrap_or(587),
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: get_env("SMTP_PASSWORD", Some(""), is_prod)?,
                from_email: get_env("SMTP_FROM_EMAIL", Some("noreply@example.com"), is_prod)?,
                from_name: get_env("SMTP_FROM_NAME", Some("Team Service"), is_prod)?,
                enabled: env::var("SMTP_ENABLED")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()
                    .unwrap_or(false),
            },
            invite: InviteConfig {
                expiry_hours: get_env("INVITE_EXPIRY_HOURS", Some("48"), is_prod)?
                    .parse()
                    .unwrap_or(48),
                max_attempts: get_env("INVITE_RATE_LIMIT_ATTEMPTS", Some("10"), is_prod)?
                    .parse()
                    .unwrap_or(10),
                window_seconds: get_env(
                    "INVITE_RATE_LIMIT_WINDOW_SECONDS",
                    Some("86400"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(86400),
            },
            rate_limit: RateLimitConfig {
                accept_ip_limit: get_env("RATE_LIMIT_ACCEPT_IP_LIMIT", Some("30"), is_prod)?
                    .parse()
                    .unwrap_or(30),
                accept_ip_window_seconds: get_env(
                    "RATE_LIMIT_ACCEPT_IP_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(60),
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.invite.expiry_hours <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "INVITE_EXPIRY_HOURS must be positive"
            )));
        }

        if self.invite.max_attempts == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "INVITE_RATE_LIMIT_ATTEMPTS must be greater than 0"
            )));
        }

        if self.invite.window_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "INVITE_RATE_LIMIT_WINDOW_SECONDS must be positive"
            )));
        }

        if self.smtp.enabled && (self.smtp.user.is_empty() || self.smtp.password.is_empty()) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SMTP_USER and SMTP_PASSWORD are required when SMTP_ENABLED is true"
            )));
        }

        if self.environment.is_prod() {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if !self.smtp.enabled {
                tracing::warn!(
                    "SMTP is disabled in production, invitation emails will only be logged"
                );
            }
        }

        Ok(())
    }
}
