use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::PriceCache;
use crate::notifier::AlertNotifier;
use crate::price_source::PriceSource;
use crate::store::AlertStore;
use crate::types::*;

/// Settings of the price monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Alerts checked concurrently (default: 5)
    pub batch_size: usize,

    /// Pause between batches (default: 1 second)
    pub batch_pause: Duration,

    /// How long a fetched fare is reused (default: 1 hour)
    pub cache_ttl: Duration,

    /// Routes kept in the fare cache (default: 5000)
    pub cache_capacity: usize,

    /// Price history older than this is deleted by the retention sweep (default: 90 days)
    pub history_retention_days: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_pause: Duration::from_secs(1),
            cache_ttl: Duration::from_secs(60 * 60), // 1 hour
            cache_capacity: 5000,
            history_retention_days: 90,
        }
    }
}

/// Checks price alerts against current fares and notifies owners.
pub struct PriceMonitor {
    store: Arc<dyn AlertStore>,
    source: Arc<dyn PriceSource>,
    notifier: Arc<dyn AlertNotifier>,
    cache: PriceCache,
    config: MonitorConfig,
}

impl PriceMonitor {
    /// Creates a monitor. `config` falls back to [`MonitorConfig::default`].
    pub fn new(
        store: Arc<dyn AlertStore>,
        source: Arc<dyn PriceSource>,
        notifier: Arc<dyn AlertNotifier>,
        config: Option<MonitorConfig>,
    ) -> Self {
        let config = config.unwrap_or_default();
        Self {
            store,
            source,
            notifier,
            cache: PriceCache::new(config.cache_capacity, config.cache_ttl),
            config,
        }
    }

    /// Checks every active, untriggered alert and records the run.
    ///
    /// Individual alert failures are reported in the summary. Only a failure to load the
    /// alerts is returned as an error, after the run log was written.
    pub async fn monitor_all_active_alerts(
        &self,
        triggered_by: TriggeredBy,
    ) -> Result<MonitoringSummary, MonitorError> {
        let started_at = Utc::now();
        let timer = Instant::now();
        info!("🔍 Starting price monitoring run ({})", triggered_by);

        match self.check_active_alerts().await {
            Ok(mut summary) => {
                summary.duration_ms = timer.elapsed().as_millis() as u64;
                info!(
                    "✅ Price monitoring run finished: {} checked, {} triggered, {} failed in {}ms",
                    summary.alerts_checked,
                    summary.alerts_triggered,
                    summary.alerts_failed,
                    summary.duration_ms
                );
                self.persist_run_log(triggered_by, started_at, &summary, None)
                    .await;
                Ok(summary)
            }
            Err(e) => {
                error!("❌ Price monitoring run failed: {}", e);
                let summary = MonitoringSummary {
                    duration_ms: timer.elapsed().as_millis() as u64,
                    ..Default::default()
                };
                self.persist_run_log(triggered_by, started_at, &summary, Some(e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    async fn check_active_alerts(&self) -> Result<MonitoringSummary, MonitorError> {
        let alerts = self.store.active_alerts().await?;
        let mut summary = MonitoringSummary::default();

        if alerts.is_empty() {
            info!("No active price alerts to check");
            return Ok(summary);
        }

        info!("Checking {} active price alerts", alerts.len());

        let batches: Vec<&[PriceAlert]> = alerts.chunks(self.config.batch_size.max(1)).collect();

        for (index, batch) in batches.iter().enumerate() {
            let outcomes = join_all(batch.iter().map(|alert| async move {
                (alert.id, self.check_single_alert(alert.id).await)
            }))
            .await;

            for (alert_id, outcome) in outcomes {
                summary.alerts_checked += 1;
                if outcome.success {
                    if outcome.triggered {
                        summary.alerts_triggered += 1;
                    }
                } else {
                    summary.alerts_failed += 1;
                    summary.errors.push(AlertFailure {
                        alert_id,
                        error: outcome
                            .error
                            .unwrap_or_else(|| "Unknown error".to_string()),
                    });
                }
            }

            if index + 1 < batches.len() {
                sleep(self.config.batch_pause).await;
            }
        }

        Ok(summary)
    }

    /// Checks one alert. Never fails: problems are described by the outcome.
    pub async fn check_single_alert(&self, alert_id: Uuid) -> AlertCheckOutcome {
        match self.try_check_alert(alert_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!("Alert {} not checked: {}", alert_id, e);
                AlertCheckOutcome::failed(e.to_string())
            }
        }
    }

    async fn try_check_alert(&self, alert_id: Uuid) -> Result<AlertCheckOutcome, MonitorError> {
        let AlertWithOwner { alert, owner } = self
            .store
            .load_alert(alert_id)
            .await?
            .ok_or(MonitorError::AlertNotFound(alert_id))?;

        if !alert.active {
            return Err(MonitorError::AlertInactive(alert_id));
        }
        if alert.triggered {
            return Err(MonitorError::AlreadyTriggered(alert_id));
        }

        let route = alert.route();
        let checked_at = Utc::now();

        let price = match self.get_price_for_route(&route).await {
            Ok(price) => price,
            Err(e) => {
                warn!("⚠️ Price fetch failed for alert {}: {}", alert_id, e);
                if let Err(touch_error) = self.store.touch_last_checked(alert_id, checked_at).await
                {
                    warn!(
                        "Failed to update last check of alert {}: {}",
                        alert_id, touch_error
                    );
                }
                return Err(e);
            }
        };

        let history = PriceHistoryRecord::observed(&route, &price, checked_at);
        if let Err(e) = self.store.append_history(&history).await {
            warn!("Failed to record price history for {}: {}", route.cache_key(), e);
        }

        if price.price > alert.target_price {
            self.store
                .update_current_price(alert_id, price.price, checked_at)
                .await?;
            debug!(
                "Alert {}: {} {} above target {}",
                alert_id, price.currency, price.price, alert.target_price
            );
            return Ok(AlertCheckOutcome::checked(price.price, false));
        }

        if !self
            .store
            .mark_triggered(alert_id, price.price, checked_at)
            .await?
        {
            return Err(MonitorError::AlreadyTriggered(alert_id));
        }

        info!(
            "🎯 Price alert {} triggered: {} → {} at {} {} (target {})",
            alert_id,
            alert.origin,
            alert.destination,
            price.currency,
            price.price,
            alert.target_price
        );

        if owner.price_alert_emails {
            if let Err(e) = self
                .notifier
                .notify_price_alert(&alert, &owner, price.price)
                .await
            {
                error!("❌ Failed to notify {} about alert {}: {}", owner.email, alert_id, e);
            }
        } else {
            info!(
                "Price alert emails disabled for user {}, skipping notification",
                owner.user_id
            );
        }

        Ok(AlertCheckOutcome::checked(price.price, true))
    }

    /// Current fare for a route, served from the cache while fresh.
    pub async fn get_price_for_route(
        &self,
        query: &RouteQuery,
    ) -> Result<PriceCheckResult, MonitorError> {
        let key = query.cache_key();

        if let Some(cached) = self.cache.get(&key).await {
            debug!("Fare cache hit for {}", key);
            return Ok(PriceCheckResult {
                currency: query.currency().to_string(),
                ..cached
            });
        }

        let price = self.source.fetch_price(query).await?;
        let result = PriceCheckResult {
            price,
            currency: query.currency().to_string(),
            provider: self.source.name().to_string(),
            cached: false,
            checked_at: Utc::now(),
        };

        self.cache.insert(key, result.clone()).await;
        Ok(result)
    }

    /// Alert, run and cache counters.
    pub async fn get_monitoring_stats(&self) -> Result<MonitoringStats, MonitorError> {
        let since = Utc::now() - chrono::Duration::hours(24);
        let alerts = self.store.alert_stats(since).await?;

        Ok(MonitoringStats {
            alerts,
            cached_prices: self.cache.len().await,
        })
    }

    /// Recorded runs, newest first.
    pub async fn get_execution_logs(
        &self,
        query: &ExecutionLogQuery,
    ) -> Result<Vec<MonitorRunLog>, MonitorError> {
        self.store.execution_logs(query).await
    }

    /// Deletes price history older than the retention period.
    pub async fn cleanup_price_history(&self) -> Result<u64, MonitorError> {
        let cutoff = Utc::now() - chrono::Duration::days(self.config.history_retention_days);
        let removed = self.store.purge_history_older_than(cutoff).await?;
        info!(
            "🧹 Removed {} price history records older than {} days",
            removed, self.config.history_retention_days
        );
        Ok(removed)
    }

    async fn persist_run_log(
        &self,
        triggered_by: TriggeredBy,
        started_at: DateTime<Utc>,
        summary: &MonitoringSummary,
        fatal_error: Option<String>,
    ) {
        let log = MonitorRunLog {
            id: Uuid::new_v4(),
            triggered_by,
            started_at,
            alerts_checked: summary.alerts_checked as i32,
            alerts_triggered: summary.alerts_triggered as i32,
            alerts_failed: summary.alerts_failed as i32,
            errors: summary.errors.clone(),
            duration_ms: summary.duration_ms as i64,
            success: fatal_error.is_none(),
            fatal_error,
        };

        if let Err(e) = self.store.record_run(&log).await {
            warn!("Failed to record price monitoring run {}: {}", log.id, e);
        }
    }
}
