// Activity log
//
// Human-readable audit trail of studio events (disclaimers signed, vouchers
// redeemed, blocks created, command runs). Write failures are logged and
// never propagate to the operation being audited.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::sync::Arc;

use crate::db::StoreError;

/// One row of the activity log
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ActivityLogEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub log: String,
}

/// Storage for activity log lines
#[async_trait]
pub trait ActivityLogRepository: Send + Sync {
    async fn insert(&self, log: &str) -> Result<(), StoreError>;

    /// Most recent entries first
    async fn recent(&self, limit: i64) -> Result<Vec<ActivityLogEntry>, StoreError>;
}

pub struct PgActivityLogRepository {
    pool: PgPool,
}

impl PgActivityLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityLogRepository for PgActivityLogRepository {
    async fn insert(&self, log: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO activity_log (log) VALUES ($1)")
            .bind(log)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<ActivityLogEntry>, StoreError> {
        let entries = sqlx::query_as::<_, ActivityLogEntry>(
            "SELECT id, timestamp, log FROM activity_log ORDER BY timestamp DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}

/// Activity logger
///
/// Cheap to clone; every service that audits holds one.
#[derive(Clone)]
pub struct ActivityLogger {
    repo: Arc<dyn ActivityLogRepository>,
}

impl ActivityLogger {
    pub fn new(repo: Arc<dyn ActivityLogRepository>) -> Self {
        Self { repo }
    }

    /// Record one line; failures are logged but do not propagate
    pub async fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(activity = %message, "activity");
        if let Err(e) = self.repo.insert(&message).await {
            tracing::error!("Failed to write activity log entry '{}': {}", message, e);
        }
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<ActivityLogEntry>, StoreError> {
        self.repo.recent(limit).await
    }
}
