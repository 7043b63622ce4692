use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

use crate::store::AlertStore;
use crate::types::*;

/// Postgres-backed [`AlertStore`].
#[derive(Clone)]
pub struct PgAlertStore {
    pool: PgPool,
}

impl PgAlertStore {
    /// Creates a new instance of `PgAlertStore` with the provided database connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn run_log_from_row(row: &PgRow) -> Result<MonitorRunLog, MonitorError> {
    let triggered_by: String = row.get("triggered_by");
    let errors: serde_json::Value = row.get("errors");

    Ok(MonitorRunLog {
        id: row.get("id"),
        triggered_by: triggered_by.parse()?,
        started_at: row.get("started_at"),
        alerts_checked: row.get("alerts_checked"),
        alerts_triggered: row.get("alerts_triggered"),
        alerts_failed: row.get("alerts_failed"),
        errors: serde_json::from_value(errors)
            .map_err(|e| MonitorError::DataFormat(e.to_string()))?,
        duration_ms: row.get("duration_ms"),
        success: row.get("success"),
        fatal_error: row.get("fatal_error"),
    })
}

#[async_trait]
impl AlertStore for PgAlertStore {
    async fn active_alerts(&self) -> Result<Vec<PriceAlert>, MonitorError> {
        let alerts = sqlx::query_as::<_, PriceAlert>(
            r#"
            SELECT
                id, user_id, origin, destination, depart_date, return_date, target_price,
                currency, active, triggered, current_price, last_checked, triggered_at,
                last_notified_at, notification_count, created_at
            FROM price_alerts
            WHERE active = true AND triggered = false
            ORDER BY last_checked ASC NULLS FIRST, created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(alerts)
    }

    async fn load_alert(&self, id: Uuid) -> Result<Option<AlertWithOwner>, MonitorError> {
        let row = sqlx::query(
            r#"
            SELECT
                a.id, a.user_id, a.origin, a.destination, a.depart_date, a.return_date,
                a.target_price, a.currency, a.active, a.triggered, a.current_price,
                a.last_checked, a.triggered_at, a.last_notified_at, a.notification_count,
                a.created_at, u.email, u.name, u.price_alert_emails
            FROM price_alerts a
            JOIN users u ON u.id = a.user_id
            WHERE a.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let alert = PriceAlert::from_row(&row)?;
                let owner = AlertOwner {
                    user_id: alert.user_id,
                    email: row.get("email"),
                    name: row.get("name"),
                    price_alert_emails: row
                        .get::<Option<bool>, _>("price_alert_emails")
                        .unwrap_or(true),
                };
                Ok(Some(AlertWithOwner { alert, owner }))
            }
            None => Ok(None),
        }
    }

    async fn touch_last_checked(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), MonitorError> {
        sqlx::query("UPDATE price_alerts SET last_checked = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_current_price(
        &self,
        id: Uuid,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<(), MonitorError> {
        sqlx::query(
            r#"
            UPDATE price_alerts
            SET current_price = $2, last_checked = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(price)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_triggered(
        &self,
        id: Uuid,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<bool, MonitorError> {
        let result = sqlx::query(
            r#"
            UPDATE price_alerts
            SET triggered = true,
                current_price = $2,
                last_checked = $3,
                triggered_at = $3,
                last_notified_at = $3,
                notification_count = notification_count + 1,
                updated_at = NOW()
            WHERE id = $1 AND triggered = false
            "#,
        )
        .bind(id)
        .bind(price)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_history(&self, record: &PriceHistoryRecord) -> Result<(), MonitorError> {
        sqlx::query(
            r#"
            INSERT INTO price_history
                (origin, destination, depart_date, return_date, price, currency, provider, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&record.origin)
        .bind(&record.destination)
        .bind(record.depart_date)
        .bind(record.return_date)
        .bind(record.price)
        .bind(&record.currency)
        .bind(&record.provider)
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge_history_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, MonitorError> {
        let result = sqlx::query("DELETE FROM price_history WHERE recorded_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn record_run(&self, log: &MonitorRunLog) -> Result<(), MonitorError> {
        let errors =
            serde_json::to_value(&log.errors).map_err(|e| MonitorError::DataFormat(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO price_monitor_logs (
                id, triggered_by, started_at, alerts_checked, alerts_triggered,
                alerts_failed, errors, duration_ms, success, fatal_error
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(log.id)
        .bind(log.triggered_by.as_str())
        .bind(log.started_at)
        .bind(log.alerts_checked)
        .bind(log.alerts_triggered)
        .bind(log.alerts_failed)
        .bind(errors)
        .bind(log.duration_ms)
        .bind(log.success)
        .bind(&log.fatal_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn alert_stats(&self, since: DateTime<Utc>) -> Result<AlertStats, MonitorError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM price_alerts WHERE active = true AND triggered = false)
                    AS active_alerts,
                (SELECT COUNT(*) FROM price_alerts WHERE triggered = true)
                    AS triggered_alerts,
                (SELECT COUNT(*) FROM price_alerts WHERE triggered_at >= $1)
                    AS triggered_last_24h,
                (SELECT COUNT(*) FROM price_history WHERE recorded_at >= $1)
                    AS price_checks_last_24h,
                (SELECT COUNT(*) FROM price_monitor_logs)
                    AS total_runs
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let last_run = self
            .execution_logs(&ExecutionLogQuery {
                limit: Some(1),
                ..Default::default()
            })
            .await?
            .into_iter()
            .next();

        Ok(AlertStats {
            active_alerts: row.get("active_alerts"),
            triggered_alerts: row.get("triggered_alerts"),
            triggered_last_24h: row.get("triggered_last_24h"),
            price_checks_last_24h: row.get("price_checks_last_24h"),
            total_runs: row.get("total_runs"),
            last_run,
        })
    }

    async fn execution_logs(
        &self,
        query: &ExecutionLogQuery,
    ) -> Result<Vec<MonitorRunLog>, MonitorError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id, triggered_by, started_at, alerts_checked, alerts_triggered,
                alerts_failed, errors, duration_ms, success, fatal_error
            FROM price_monitor_logs
            WHERE ($1::TEXT IS NULL OR triggered_by = $1)
            ORDER BY started_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(query.triggered_by.map(|t| t.as_str()))
        .bind(i64::from(query.limit()))
        .bind(i64::from(query.offset()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(run_log_from_row).collect()
    }
}
