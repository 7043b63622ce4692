use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::*;

/// Persistence used by the price monitor.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Active, untriggered alerts, never-checked first, then least recently checked.
    async fn active_alerts(&self) -> Result<Vec<PriceAlert>, MonitorError>;

    /// Loads an alert with its owner.
    async fn load_alert(&self, id: Uuid) -> Result<Option<AlertWithOwner>, MonitorError>;

    /// Stamps `last_checked` without touching anything else.
    async fn touch_last_checked(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), MonitorError>;

    /// Stores the latest fare for an alert that has not reached its target.
    async fn update_current_price(
        &self,
        id: Uuid,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<(), MonitorError>;

    /// Marks the alert triggered if it is not already.
    ///
    /// Returns true only for the call that flipped the flag.
    async fn mark_triggered(
        &self,
        id: Uuid,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<bool, MonitorError>;

    /// Appends a fare to the price history.
    async fn append_history(&self, record: &PriceHistoryRecord) -> Result<(), MonitorError>;

    /// Deletes history recorded before `cutoff`, returning the number of rows removed.
    async fn purge_history_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, MonitorError>;

    /// Persists a monitoring run.
    async fn record_run(&self, log: &MonitorRunLog) -> Result<(), MonitorError>;

    /// Alert and run counters, with 24-hour counts measured from `since`.
    async fn alert_stats(&self, since: DateTime<Utc>) -> Result<AlertStats, MonitorError>;

    /// Run logs, newest first.
    async fn execution_logs(
        &self,
        query: &ExecutionLogQuery,
    ) -> Result<Vec<MonitorRunLog>, MonitorError>;
}
