use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::types::{DeliveryStatus, EmailError, EmailRequest, EmailResult};

/// Longest error text stored in an audit row.
const MAX_ERROR_LEN: usize = 1000;

/// Audit store for email sends.
#[async_trait]
pub trait EmailLogSink: Send + Sync {
    /// Records a send that is about to start.
    async fn log_pending(&self, id: Uuid, request: &EmailRequest) -> Result<(), EmailError>;

    /// Records an accepted send.
    async fn log_sent(
        &self,
        id: Uuid,
        result: &EmailResult,
        elapsed: Duration,
    ) -> Result<(), EmailError>;

    /// Records a send that no provider accepted.
    async fn log_failed(&self, id: Uuid, error: &str, elapsed: Duration)
    -> Result<(), EmailError>;
}

/// Best-effort wrapper around an [`EmailLogSink`].
///
/// Audit failures are logged and swallowed so they never block a send.
#[derive(Clone)]
pub struct DeliveryTelemetry {
    sink: Arc<dyn EmailLogSink>,
}

impl DeliveryTelemetry {
    /// Wraps a sink.
    pub fn new(sink: Arc<dyn EmailLogSink>) -> Self {
        Self { sink }
    }

    /// Telemetry that records nothing.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopEmailLog))
    }

    /// Records a pending send.
    pub async fn pending(&self, id: Uuid, request: &EmailRequest) {
        if let Err(e) = self.sink.log_pending(id, request).await {
            warn!("Failed to write pending email log {}: {}", id, e);
        }
    }

    /// Records an accepted send.
    pub async fn sent(&self, id: Uuid, result: &EmailResult, elapsed: Duration) {
        if let Err(e) = self.sink.log_sent(id, result, elapsed).await {
            warn!("Failed to write sent email log {}: {}", id, e);
        }
    }

    /// Records a failed send.
    pub async fn failed(&self, id: Uuid, error: &str, elapsed: Duration) {
        if let Err(e) = self.sink.log_failed(id, error, elapsed).await {
            warn!("Failed to write failed email log {}: {}", id, e);
        }
    }
}

impl Default for DeliveryTelemetry {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Sink that keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEmailLog;

#[async_trait]
impl EmailLogSink for NoopEmailLog {
    async fn log_pending(&self, _id: Uuid, _request: &EmailRequest) -> Result<(), EmailError> {
        Ok(())
    }

    async fn log_sent(
        &self,
        _id: Uuid,
        _result: &EmailResult,
        _elapsed: Duration,
    ) -> Result<(), EmailError> {
        Ok(())
    }

    async fn log_failed(
        &self,
        _id: Uuid,
        _error: &str,
        _elapsed: Duration,
    ) -> Result<(), EmailError> {
        Ok(())
    }
}

/// Sink writing the `email_logs` table.
#[derive(Clone)]
pub struct PgEmailLog {
    pool: PgPool,
}

impl PgEmailLog {
    /// Creates a sink on the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn truncate_error(error: &str) -> String {
    error.chars().take(MAX_ERROR_LEN).collect()
}

#[async_trait]
impl EmailLogSink for PgEmailLog {
    async fn log_pending(&self, id: Uuid, request: &EmailRequest) -> Result<(), EmailError> {
        sqlx::query(
            r#"
            INSERT INTO email_logs
                (id, recipients, subject, template, status, priority, campaign_id, contact_id, tags)
            VALUES ($1, $2, $3, $4, 'PENDING', $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(request.recipient_list())
        .bind(&request.subject)
        .bind(&request.template)
        .bind(request.priority.as_str())
        .bind(&request.campaign_id)
        .bind(&request.contact_id)
        .bind(&request.tags)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn log_sent(
        &self,
        id: Uuid,
        result: &EmailResult,
        elapsed: Duration,
    ) -> Result<(), EmailError> {
        sqlx::query(
            r#"
            UPDATE email_logs
            SET status = $2,
                provider = $3,
                provider_message_id = $4,
                sent_at = NOW(),
                processing_time_ms = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(result.delivery_status.as_db_str())
        .bind(&result.provider)
        .bind(&result.message_id)
        .bind(elapsed.as_millis() as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn log_failed(
        &self,
        id: Uuid,
        error: &str,
        elapsed: Duration,
    ) -> Result<(), EmailError> {
        sqlx::query(
            r#"
            UPDATE email_logs
            SET status = $2,
                error = $3,
                processing_time_ms = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(DeliveryStatus::Failed.as_db_str())
        .bind(truncate_error(error))
        .bind(elapsed.as_millis() as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
