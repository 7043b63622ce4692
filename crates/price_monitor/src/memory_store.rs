use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::store::AlertStore;
use crate::types::*;

#[derive(Debug, Default)]
struct State {
    alerts: HashMap<Uuid, PriceAlert>,
    owners: HashMap<Uuid, AlertOwner>,
    history: Vec<PriceHistoryRecord>,
    runs: Vec<MonitorRunLog>,
}

/// In-memory [`AlertStore`] for local development and tests.
#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    state: Mutex<State>,
    fail_queries: AtomicBool,
}

impl InMemoryAlertStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user.
    pub async fn insert_owner(&self, owner: AlertOwner) {
        self.state.lock().await.owners.insert(owner.user_id, owner);
    }

    /// Adds or replaces an alert.
    pub async fn insert_alert(&self, alert: PriceAlert) {
        self.state.lock().await.alerts.insert(alert.id, alert);
    }

    /// Current state of an alert.
    pub async fn alert(&self, id: Uuid) -> Option<PriceAlert> {
        self.state.lock().await.alerts.get(&id).cloned()
    }

    /// Every history record, oldest first.
    pub async fn history(&self) -> Vec<PriceHistoryRecord> {
        self.state.lock().await.history.clone()
    }

    /// Every run log, oldest first.
    pub async fn runs(&self) -> Vec<MonitorRunLog> {
        self.state.lock().await.runs.clone()
    }

    /// Makes the active-alert query fail, simulating a lost database.
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn active_alerts(&self) -> Result<Vec<PriceAlert>, MonitorError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(MonitorError::Database(sqlx::Error::PoolClosed));
        }

        let state = self.state.lock().await;
        let mut alerts: Vec<PriceAlert> = state
            .alerts
            .values()
            .filter(|a| a.active && !a.triggered)
            .cloned()
            .collect();

        // None sorts before Some
        alerts.sort_by(|a, b| {
            a.last_checked
                .cmp(&b.last_checked)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(alerts)
    }

    async fn load_alert(&self, id: Uuid) -> Result<Option<AlertWithOwner>, MonitorError> {
        let state = self.state.lock().await;
        let Some(alert) = state.alerts.get(&id) else {
            return Ok(None);
        };
        let owner = state.owners.get(&alert.user_id).cloned().ok_or_else(|| {
            MonitorError::DataFormat(format!("alert {} has no owner {}", id, alert.user_id))
        })?;

        Ok(Some(AlertWithOwner {
            alert: alert.clone(),
            owner,
        }))
    }

    async fn touch_last_checked(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), MonitorError> {
        if let Some(alert) = self.state.lock().await.alerts.get_mut(&id) {
            alert.last_checked = Some(at);
        }
        Ok(())
    }

    async fn update_current_price(
        &self,
        id: Uuid,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<(), MonitorError> {
        if let Some(alert) = self.state.lock().await.alerts.get_mut(&id) {
            alert.current_price = Some(price);
            alert.last_checked = Some(at);
        }
        Ok(())
    }

    async fn mark_triggered(
        &self,
        id: Uuid,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<bool, MonitorError> {
        let mut state = self.state.lock().await;
        match state.alerts.get_mut(&id) {
            Some(alert) if !alert.triggered => {
                alert.triggered = true;
                alert.current_price = Some(price);
                alert.last_checked = Some(at);
                alert.triggered_at = Some(at);
                alert.last_notified_at = Some(at);
                alert.notification_count += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_history(&self, record: &PriceHistoryRecord) -> Result<(), MonitorError> {
        self.state.lock().await.history.push(record.clone());
        Ok(())
    }

    async fn purge_history_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, MonitorError> {
        let mut state = self.state.lock().await;
        let before = state.history.len();
        state.history.retain(|r| r.recorded_at >= cutoff);
        Ok((before - state.history.len()) as u64)
    }

    async fn record_run(&self, log: &MonitorRunLog) -> Result<(), MonitorError> {
        self.state.lock().await.runs.push(log.clone());
        Ok(())
    }

    async fn alert_stats(&self, since: DateTime<Utc>) -> Result<AlertStats, MonitorError> {
        let state = self.state.lock().await;
        let alerts = || state.alerts.values();

        Ok(AlertStats {
            active_alerts: alerts().filter(|a| a.active && !a.triggered).count() as i64,
            triggered_alerts: alerts().filter(|a| a.triggered).count() as i64,
            triggered_last_24h: alerts()
                .filter(|a| a.triggered_at.is_some_and(|t| t >= since))
                .count() as i64,
            price_checks_last_24h: state
                .history
                .iter()
                .filter(|r| r.recorded_at >= since)
                .count() as i64,
            total_runs: state.runs.len() as i64,
            last_run: state.runs.iter().max_by_key(|r| r.started_at).cloned(),
        })
    }

    async fn execution_logs(
        &self,
        query: &ExecutionLogQuery,
    ) -> Result<Vec<MonitorRunLog>, MonitorError> {
        let state = self.state.lock().await;
        let mut runs: Vec<MonitorRunLog> = state
            .runs
            .iter()
            .filter(|r| query.triggered_by.is_none_or(|t| r.triggered_by == t))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        Ok(runs
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn record(recorded_at: DateTime<Utc>) -> PriceHistoryRecord {
        PriceHistoryRecord {
            origin: "LAX".to_string(),
            destination: "JFK".to_string(),
            depart_date: NaiveDate::from_ymd_opt(2026, 12, 20).unwrap(),
            return_date: None,
            price: 420.0,
            currency: "USD".to_string(),
            provider: "mock".to_string(),
            recorded_at,
        }
    }

    #[tokio::test]
    async fn test_purge_removes_only_old_records() {
        let store = InMemoryAlertStore::new();
        let now = Utc::now();
        store.append_history(&record(now - Duration::days(120))).await.unwrap();
        store.append_history(&record(now - Duration::days(91))).await.unwrap();
        store.append_history(&record(now - Duration::days(3))).await.unwrap();

        let removed = store
            .purge_history_older_than(now - Duration::days(90))
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_active_alerts_never_checked_first() {
        let store = InMemoryAlertStore::new();
        let user = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2026, 12, 20).unwrap();

        let mut checked = PriceAlert::new(user, "LAX", "JFK", date, 400.0);
        checked.last_checked = Some(Utc::now());
        let fresh = PriceAlert::new(user, "SFO", "BOS", date, 300.0);
        let mut done = PriceAlert::new(user, "SEA", "MIA", date, 200.0);
        done.triggered = true;

        store.insert_alert(checked.clone()).await;
        store.insert_alert(fresh.clone()).await;
        store.insert_alert(done).await;

        let ids: Vec<Uuid> = store
            .active_alerts()
            .await
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![fresh.id, checked.id]);
    }

    #[tokio::test]
    async fn test_mark_triggered_claims_once() {
        let store = InMemoryAlertStore::new();
        let alert = PriceAlert::new(
            Uuid::new_v4(),
            "LAX",
            "JFK",
            NaiveDate::from_ymd_opt(2026, 12, 20).unwrap(),
            400.0,
        );
        store.insert_alert(alert.clone()).await;

        let now = Utc::now();
        assert!(store.mark_triggered(alert.id, 380.0, now).await.unwrap());
        assert!(!store.mark_triggered(alert.id, 370.0, now).await.unwrap());

        let stored = store.alert(alert.id).await.unwrap();
        assert_eq!(stored.current_price, Some(380.0));
        assert_eq!(stored.notification_count, 1);
    }
}
