use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use email_delivery::{
    EmailDeliveryService, MockTransport, Provider, ProviderRegistry, ProviderSettings,
    TransportError,
};
use price_monitor::*;
use uuid::Uuid;

/// Price source returning a configured fare per destination, failing for unknown ones.
#[derive(Default)]
struct ScriptedPriceSource {
    prices: Mutex<HashMap<String, f64>>,
    calls: AtomicUsize,
}

impl ScriptedPriceSource {
    fn set_price(&self, destination: &str, price: f64) {
        self.prices
            .lock()
            .unwrap()
            .insert(destination.to_string(), price);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for ScriptedPriceSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_price(&self, query: &RouteQuery) -> Result<f64, MonitorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prices
            .lock()
            .unwrap()
            .get(&query.destination)
            .copied()
            .ok_or_else(|| MonitorError::PriceSource("upstream unavailable".to_string()))
    }
}

struct Harness {
    monitor: PriceMonitor,
    store: Arc<InMemoryAlertStore>,
    source: Arc<ScriptedPriceSource>,
    transport: Arc<MockTransport>,
    owner: AlertOwner,
}

impl Harness {
    async fn new() -> Self {
        let store = Arc::new(InMemoryAlertStore::new());
        let source = Arc::new(ScriptedPriceSource::default());
        let transport = Arc::new(MockTransport::new());

        let registry = ProviderRegistry::new(vec![Provider::new(
            ProviderSettings {
                name: "TEST".to_string(),
                priority: 1,
                requests_per_minute: 1000,
                timeout: Duration::from_secs(30),
            },
            transport.clone(),
        )]);
        let delivery = Arc::new(EmailDeliveryService::new(Arc::new(registry)));

        let monitor = PriceMonitor::new(
            store.clone(),
            source.clone(),
            Arc::new(EmailAlertNotifier::new(delivery)),
            None,
        );

        let owner = AlertOwner {
            user_id: Uuid::new_v4(),
            email: "traveler@example.com".to_string(),
            name: Some("Ana".to_string()),
            price_alert_emails: true,
        };
        store.insert_owner(owner.clone()).await;

        Self {
            monitor,
            store,
            source,
            transport,
            owner,
        }
    }

    async fn alert(&self, destination: &str, target_price: f64) -> PriceAlert {
        let alert = PriceAlert::new(
            self.owner.user_id,
            "LAX",
            destination,
            NaiveDate::from_ymd_opt(2026, 12, 20).unwrap(),
            target_price,
        );
        self.store.insert_alert(alert.clone()).await;
        alert
    }
}

#[tokio::test]
async fn test_alert_triggers_when_fare_reaches_target() {
    let h = Harness::new().await;
    h.source.set_price("JFK", 380.0);
    let alert = h.alert("JFK", 400.0).await;

    let outcome = h.monitor.check_single_alert(alert.id).await;

    assert!(outcome.success);
    assert!(outcome.triggered);
    assert_eq!(outcome.current_price, Some(380.0));

    let history = h.store.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].price, 380.0);
    assert_eq!(history[0].provider, "scripted");

    let stored = h.store.alert(alert.id).await.unwrap();
    assert!(stored.triggered);
    assert_eq!(stored.current_price, Some(380.0));
    assert_eq!(stored.notification_count, 1);
    assert!(stored.triggered_at.is_some());
    assert!(stored.last_notified_at.is_some());

    assert_eq!(h.transport.call_count(), 1);
    let requests = h.transport.requests().await;
    assert_eq!(requests[0].to, vec!["traveler@example.com".to_string()]);
    let data = requests[0].template_data.as_ref().unwrap();
    assert_eq!(data["currentPrice"], 380.0);
    assert_eq!(data["targetPrice"], 400.0);
    assert_eq!(data["savingsPercent"], 5.0);
    assert_eq!(requests[0].subject, "🎉 Price Alert: LAX → JFK - USD 380.00");
}

#[tokio::test]
async fn test_fare_above_target_only_updates_price() {
    let h = Harness::new().await;
    h.source.set_price("JFK", 450.0);
    let alert = h.alert("JFK", 400.0).await;

    let outcome = h.monitor.check_single_alert(alert.id).await;

    assert!(outcome.success);
    assert!(!outcome.triggered);
    assert_eq!(outcome.current_price, Some(450.0));

    assert_eq!(h.store.history().await[0].price, 450.0);

    let stored = h.store.alert(alert.id).await.unwrap();
    assert!(!stored.triggered);
    assert_eq!(stored.current_price, Some(450.0));
    assert!(stored.last_checked.is_some());
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test]
async fn test_triggered_alert_is_not_checked_again() {
    let h = Harness::new().await;
    h.source.set_price("JFK", 380.0);
    let mut alert = h.alert("JFK", 400.0).await;
    alert.triggered = true;
    h.store.insert_alert(alert.clone()).await;

    let outcome = h.monitor.check_single_alert(alert.id).await;

    assert!(!outcome.success);
    assert!(!outcome.triggered);
    assert_eq!(h.source.calls(), 0);
    assert!(h.store.history().await.is_empty());
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test]
async fn test_missing_and_inactive_alerts_are_rejected() {
    let h = Harness::new().await;
    h.source.set_price("JFK", 380.0);
    let mut alert = h.alert("JFK", 400.0).await;
    alert.active = false;
    h.store.insert_alert(alert.clone()).await;

    let inactive = h.monitor.check_single_alert(alert.id).await;
    assert!(!inactive.success);
    assert!(inactive.error.unwrap().contains("is not active"));

    let missing = h.monitor.check_single_alert(Uuid::new_v4()).await;
    assert!(!missing.success);
    assert!(missing.error.unwrap().contains("not found"));

    assert_eq!(h.source.calls(), 0);
}

#[tokio::test]
async fn test_fetch_failure_only_touches_last_checked() {
    let h = Harness::new().await;
    let alert = h.alert("JFK", 400.0).await;

    let outcome = h.monitor.check_single_alert(alert.id).await;

    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("Price source error: upstream unavailable")
    );

    let stored = h.store.alert(alert.id).await.unwrap();
    assert!(stored.last_checked.is_some());
    assert!(stored.current_price.is_none());
    assert!(!stored.triggered);
    assert!(h.store.history().await.is_empty());

    // Still eligible for the next run
    assert_eq!(h.store.active_alerts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_notification_preference_off_skips_email() {
    let h = Harness::new().await;
    h.source.set_price("JFK", 380.0);
    h.store
        .insert_owner(AlertOwner {
            price_alert_emails: false,
            ..h.owner.clone()
        })
        .await;
    let alert = h.alert("JFK", 400.0).await;

    let outcome = h.monitor.check_single_alert(alert.id).await;

    assert!(outcome.triggered);
    assert!(h.store.alert(alert.id).await.unwrap().triggered);
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test]
async fn test_failed_notification_keeps_alert_triggered() {
    let h = Harness::new().await;
    h.source.set_price("JFK", 380.0);
    h.transport
        .push_failure(TransportError::Rejected("mailbox unavailable".to_string()))
        .await;
    let alert = h.alert("JFK", 400.0).await;

    let outcome = h.monitor.check_single_alert(alert.id).await;

    assert!(outcome.success);
    assert!(outcome.triggered);
    assert!(h.store.alert(alert.id).await.unwrap().triggered);
    assert_eq!(h.transport.call_count(), 1);
}

#[tokio::test]
async fn test_concurrent_checks_notify_once() {
    let h = Harness::new().await;
    h.source.set_price("JFK", 380.0);
    let alert = h.alert("JFK", 400.0).await;

    let (first, second) = tokio::join!(
        h.monitor.check_single_alert(alert.id),
        h.monitor.check_single_alert(alert.id)
    );

    let triggered = [&first, &second].iter().filter(|o| o.triggered).count();
    assert_eq!(triggered, 1);
    assert_eq!(h.transport.call_count(), 1);
    assert_eq!(h.store.alert(alert.id).await.unwrap().notification_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cached_fare_reused_within_ttl() {
    let h = Harness::new().await;
    h.source.set_price("JFK", 380.0);
    let route = RouteQuery {
        origin: "LAX".to_string(),
        destination: "JFK".to_string(),
        depart_date: NaiveDate::from_ymd_opt(2026, 12, 20).unwrap(),
        return_date: None,
        currency: None,
    };

    let first = h.monitor.get_price_for_route(&route).await.unwrap();
    h.source.set_price("JFK", 395.0);
    let second = h.monitor.get_price_for_route(&route).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.price, second.price);
    assert_eq!(h.source.calls(), 1);

    tokio::time::advance(Duration::from_secs(3601)).await;

    let third = h.monitor.get_price_for_route(&route).await.unwrap();
    assert!(!third.cached);
    assert_eq!(third.price, 395.0);
    assert_eq!(h.source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_run_summary_and_log() {
    let h = Harness::new().await;
    h.source.set_price("JFK", 380.0);
    h.source.set_price("SFO", 260.0);
    h.source.set_price("ORD", 150.0);

    let triggering = h.alert("JFK", 400.0).await;
    for _ in 0..4 {
        h.alert("SFO", 200.0).await;
    }
    let failing = h.alert("BOS", 300.0).await;
    h.alert("ORD", 150.0).await;

    let summary = h
        .monitor
        .monitor_all_active_alerts(TriggeredBy::Manual)
        .await
        .unwrap();

    assert_eq!(summary.alerts_checked, 7);
    assert_eq!(summary.alerts_triggered, 2);
    assert_eq!(summary.alerts_failed, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].alert_id, failing.id);
    assert!(h.store.alert(triggering.id).await.unwrap().triggered);
    assert_eq!(h.transport.call_count(), 2);

    let runs = h.store.runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].triggered_by, TriggeredBy::Manual);
    assert!(runs[0].success);
    assert_eq!(runs[0].alerts_checked, 7);
    assert_eq!(runs[0].errors, summary.errors);

    // Triggered alerts drop out of the next run
    let next = h
        .monitor
        .monitor_all_active_alerts(TriggeredBy::Cron)
        .await
        .unwrap();
    assert_eq!(next.alerts_checked, 5);
    assert_eq!(next.alerts_triggered, 0);
}

#[tokio::test]
async fn test_empty_run_is_still_logged() {
    let h = Harness::new().await;

    let summary = h
        .monitor
        .monitor_all_active_alerts(TriggeredBy::Cron)
        .await
        .unwrap();

    assert_eq!(summary.alerts_checked, 0);
    assert!(summary.errors.is_empty());
    assert_eq!(h.store.runs().await.len(), 1);
}

#[tokio::test]
async fn test_fatal_error_is_logged_and_returned() {
    let h = Harness::new().await;
    h.store.fail_queries(true);

    let result = h.monitor.monitor_all_active_alerts(TriggeredBy::Cron).await;

    assert!(matches!(result, Err(MonitorError::Database(_))));
    let runs = h.store.runs().await;
    assert_eq!(runs.len(), 1);
    assert!(!runs[0].success);
    assert!(runs[0].fatal_error.is_some());
}

#[tokio::test]
async fn test_stats_and_execution_logs() {
    let h = Harness::new().await;
    h.source.set_price("JFK", 380.0);
    h.source.set_price("SFO", 500.0);
    h.alert("JFK", 400.0).await;
    h.alert("SFO", 400.0).await;

    h.monitor
        .monitor_all_active_alerts(TriggeredBy::Cron)
        .await
        .unwrap();
    h.monitor
        .monitor_all_active_alerts(TriggeredBy::Manual)
        .await
        .unwrap();

    let stats = h.monitor.get_monitoring_stats().await.unwrap();
    assert_eq!(stats.alerts.active_alerts, 1);
    assert_eq!(stats.alerts.triggered_alerts, 1);
    assert_eq!(stats.alerts.triggered_last_24h, 1);
    assert_eq!(stats.alerts.price_checks_last_24h, 3);
    assert_eq!(stats.alerts.total_runs, 2);
    assert_eq!(
        stats.alerts.last_run.map(|r| r.triggered_by),
        Some(TriggeredBy::Manual)
    );
    assert_eq!(stats.cached_prices, 2);

    let cron_only = h
        .monitor
        .get_execution_logs(&ExecutionLogQuery {
            triggered_by: Some(TriggeredBy::Cron),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(cron_only.len(), 1);
    assert_eq!(cron_only[0].alerts_checked, 2);
}

#[tokio::test]
async fn test_cleanup_uses_retention_period() {
    let h = Harness::new().await;
    let route = RouteQuery {
        origin: "LAX".to_string(),
        destination: "JFK".to_string(),
        depart_date: NaiveDate::from_ymd_opt(2026, 12, 20).unwrap(),
        return_date: None,
        currency: None,
    };
    for days_ago in [200, 95, 10] {
        let observed_at = Utc::now() - chrono::Duration::days(days_ago);
        let fare = PriceCheckResult {
            price: 400.0,
            currency: "USD".to_string(),
            provider: "scripted".to_string(),
            cached: false,
            checked_at: observed_at,
        };
        h.store
            .append_history(&PriceHistoryRecord::observed(&route, &fare, observed_at))
            .await
            .unwrap();
    }

    assert_eq!(h.monitor.cleanup_price_history().await.unwrap(), 2);
    assert_eq!(h.store.history().await.len(), 1);
}

#[tokio::test]
async fn test_cached_fare_is_labelled_with_each_alert_currency() {
    let h = Harness::new().await;
    h.source.set_price("JFK", 500.0);
    let usd = h.alert("JFK", 100.0).await;
    let mut eur = PriceAlert::new(
        h.owner.user_id,
        "LAX",
        "JFK",
        NaiveDate::from_ymd_opt(2026, 12, 20).unwrap(),
        100.0,
    );
    eur.currency = "EUR".to_string();
    h.store.insert_alert(eur.clone()).await;

    assert!(h.monitor.check_single_alert(usd.id).await.success);
    assert!(h.monitor.check_single_alert(eur.id).await.success);
    assert_eq!(h.source.calls(), 1);

    let currencies: Vec<String> = h
        .store
        .history()
        .await
        .into_iter()
        .map(|record| record.currency)
        .collect();
    assert_eq!(currencies, vec!["USD".to_string(), "EUR".to_string()]);

    let fare = h.monitor.get_price_for_route(&eur.route()).await.unwrap();
    assert!(fare.cached);
    assert_eq!(fare.currency, "EUR");
}

#[tokio::test]
async fn test_history_is_stamped_with_check_time() {
    let h = Harness::new().await;
    h.source.set_price("JFK", 500.0);
    let alert = h.alert("JFK", 100.0).await;

    let first = h.monitor.get_price_for_route(&alert.route()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let before_check = Utc::now();

    h.monitor.check_single_alert(alert.id).await;

    let history = h.store.history().await;
    assert_eq!(history.len(), 1);
    assert!(history[0].recorded_at >= before_check);
    assert!(history[0].recorded_at > first.checked_at);
}

/// Store whose `touch_last_checked` always fails.
struct TouchFailingStore(Arc<InMemoryAlertStore>);

#[async_trait]
impl AlertStore for TouchFailingStore {
    async fn active_alerts(&self) -> Result<Vec<PriceAlert>, MonitorError> {
        self.0.active_alerts().await
    }

    async fn load_alert(&self, id: Uuid) -> Result<Option<AlertWithOwner>, MonitorError> {
        self.0.load_alert(id).await
    }

    async fn touch_last_checked(
        &self,
        _id: Uuid,
        _at: chrono::DateTime<Utc>,
    ) -> Result<(), MonitorError> {
        Err(MonitorError::Database(sqlx::Error::PoolClosed))
    }

    async fn update_current_price(
        &self,
        id: Uuid,
        price: f64,
        at: chrono::DateTime<Utc>,
    ) -> Result<(), MonitorError> {
        self.0.update_current_price(id, price, at).await
    }

    async fn mark_triggered(
        &self,
        id: Uuid,
        price: f64,
        at: chrono::DateTime<Utc>,
    ) -> Result<bool, MonitorError> {
        self.0.mark_triggered(id, price, at).await
    }

    async fn append_history(&self, record: &PriceHistoryRecord) -> Result<(), MonitorError> {
        self.0.append_history(record).await
    }

    async fn purge_history_older_than(
        &self,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<u64, MonitorError> {
        self.0.purge_history_older_than(cutoff).await
    }

    async fn record_run(&self, log: &MonitorRunLog) -> Result<(), MonitorError> {
        self.0.record_run(log).await
    }

    async fn alert_stats(&self, since: chrono::DateTime<Utc>) -> Result<AlertStats, MonitorError> {
        self.0.alert_stats(since).await
    }

    async fn execution_logs(
        &self,
        query: &ExecutionLogQuery,
    ) -> Result<Vec<MonitorRunLog>, MonitorError> {
        self.0.execution_logs(query).await
    }
}

#[tokio::test]
async fn test_fetch_error_survives_failed_last_checked_update() {
    let inner = Arc::new(InMemoryAlertStore::new());
    let owner = AlertOwner {
        user_id: Uuid::new_v4(),
        email: "traveler@example.com".to_string(),
        name: None,
        price_alert_emails: true,
    };
    inner.insert_owner(owner.clone()).await;
    let alert = PriceAlert::new(
        owner.user_id,
        "LAX",
        "SEA",
        NaiveDate::from_ymd_opt(2026, 12, 20).unwrap(),
        100.0,
    );
    inner.insert_alert(alert.clone()).await;

    let delivery = Arc::new(EmailDeliveryService::new(Arc::new(
        ProviderRegistry::dry_run(),
    )));
    let monitor = PriceMonitor::new(
        Arc::new(TouchFailingStore(inner)),
        Arc::new(ScriptedPriceSource::default()),
        Arc::new(EmailAlertNotifier::new(delivery)),
        None,
    );

    let outcome = monitor.check_single_alert(alert.id).await;

    assert!(!outcome.success);
    let error = outcome.error.unwrap();
    assert!(error.contains("upstream unavailable"), "{error}");
}
