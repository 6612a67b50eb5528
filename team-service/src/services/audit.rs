//! Best-effort audit trail.
//!
//! Writes go through [`AuditRecorder::record`], which logs and swallows
//! sink failures so an audit outage can never fail the business operation
//! it describes. Reads use the same sink with filters and pagination.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::AuditEvent;

/// Filters for reading the trail back out.
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub actor_user_id: Option<Uuid>,
    pub action_code: Option<String>,
    pub target_id: Option<Uuid>,
    pub from_utc: Option<DateTime<Utc>>,
    pub to_utc: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            actor_user_id: None,
            action_code: None,
            target_id: None,
            from_utc: None,
            to_utc: None,
            limit: 100,
            offset: 0,
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), anyhow::Error>;

    /// Events for a provider, newest first, plus the unpaginated total.
    async fn list(
        &self,
        provider_id: Uuid,
        query: &AuditQuery,
    ) -> Result<(Vec<AuditEvent>, i64), anyhow::Error>;
}

/// Enforces the swallow-and-log contract for audit writes.
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Append an event. Sink failures are logged and dropped, never
    /// surfaced to the caller.
    pub async fn record(&self, event: AuditEvent) {
        let provider_id = event.provider_id;
        let action = event.action_code.clone();
        if let Err(e) = self.sink.append(event).await {
            tracing::error!(
                provider_id = %provider_id,
                action = %action,
                error = %e,
                "Failed to write audit event"
            );
        }
    }

    pub async fn list(
        &self,
        provider_id: Uuid,
        query: &AuditQuery,
    ) -> Result<(Vec<AuditEvent>, i64), anyhow::Error> {
        self.sink.list(provider_id, query).await
    }
}

pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, event: AuditEvent) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (event_id, provider_id, actor_user_id, action_code, target_id, detail, ip_address, user_agent, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.event_id)
        .bind(event.provider_id)
        .bind(event.actor_user_id)
        .bind(&event.action_code)
        .bind(event.target_id)
        .bind(&event.detail)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(event.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(
        &self,
        provider_id: Uuid,
        query: &AuditQuery,
    ) -> Result<(Vec<AuditEvent>, i64), anyhow::Error> {
        // Build dynamic WHERE clause
        let mut conditions = vec!["provider_id = $1".to_string()];
        let mut param_idx = 2;

        if query.actor_user_id.is_some() {
            conditions.push(format!("actor_user_id = ${}", param_idx));
            param_idx += 1;
        }
        if query.action_code.is_some() {
            conditions.push(format!("action_code = ${}", param_idx));
            param_idx += 1;
        }
        if query.target_id.is_some() {
            conditions.push(format!("target_id = ${}", param_idx));
            param_idx += 1;
        }
        if query.from_utc.is_some() {
            conditions.push(format!("created_utc >= ${}", param_idx));
            param_idx += 1;
        }
        if query.to_utc.is_some() {
            conditions.push(format!("created_utc <= ${}", param_idx));
            param_idx += 1;
        }

        let where_clause = conditions.join(" AND ");

        let count_query = format!("SELECT COUNT(*) FROM audit_events WHERE {}", where_clause);
        let data_query = format!(
            "SELECT event_id, provider_id, actor_user_id, action_code, target_id, detail, ip_address, user_agent, created_utc \
             FROM audit_events WHERE {} ORDER BY created_utc DESC LIMIT ${} OFFSET ${}",
            where_clause,
            param_idx,
            param_idx + 1
        );

        let mut count_q = sqlx::query_as::<_, (i64,)>(&count_query).bind(provider_id);
        if let Some(user_id) = query.actor_user_id {
            count_q = count_q.bind(user_id);
        }
        if let Some(action) = &query.action_code {
            count_q = count_q.bind(action);
        }
        if let Some(target) = query.target_id {
            count_q = count_q.bind(target);
        }
        if let Some(from) = query.from_utc {
            count_q = count_q.bind(from);
        }
        if let Some(to) = query.to_utc {
            count_q = count_q.bind(to);
        }

        let (total,) = count_q.fetch_one(&self.pool).await?;

        let mut data_q = sqlx::query_as::<_, AuditEvent>(&data_query).bind(provider_id);
        if let Some(user_id) = query.actor_user_id {
            data_q = data_q.bind(user_id);
        }
        if let Some(action) = &query.action_code {
            data_q = data_q.bind(action);
        }
        if let Some(target) = query.target_id {
            data_q = data_q.bind(target);
        }
        if let Some(from) = query.from_utc {
            data_q = data_q.bind(from);
        }
        if let Some(to) = query.to_utc {
            data_q = data_q.bind(to);
        }
        data_q = data_q.bind(query.limit).bind(query.offset);

        let events = data_q.fetch_all(&self.pool).await?;

        Ok((events, total))
    }
}

/// In-memory sink for tests, with a failure toggle.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
    fail: AtomicBool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent append fail.
    pub fn fail_appends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, event: AuditEvent) -> Result<(), anyhow::Error> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("Injected audit sink failure");
        }
        self.events.lock().await.push(event);
        Ok(())
    }

    async fn list(
        &self,
        provider_id: Uuid,
        query: &AuditQuery,
    ) -> Result<(Vec<AuditEvent>, i64), anyhow::Error> {
        let events = self.events.lock().await;
        let mut matched: Vec<AuditEvent> = events
            .iter()
            .filter(|e| {
                e.provider_id == provider_id
                    && query
                        .actor_user_id
                        .is_none_or(|a| e.actor_user_id == Some(a))
                    && query
                        .action_code
                        .as_deref()
                        .is_none_or(|a| e.action_code == a)
                    && query.target_id.is_none_or(|t| e.target_id == Some(t))
                    && query.from_utc.is_none_or(|f| e.created_utc >= f)
                    && query.to_utc.is_none_or(|t| e.created_utc <= t)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));

        let total = matched.len() as i64;
        let page = matched
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }
}
