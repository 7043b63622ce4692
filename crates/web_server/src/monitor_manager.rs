use std::sync::Arc;
use std::time::Duration;

use price_monitor::{PriceMonitor, TriggeredBy};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

/// Runs the price monitor and the history retention sweep in the background.
pub struct MonitorManager {
    monitor: Arc<PriceMonitor>,
    monitor_interval: Duration,
    cleanup_interval: Duration,
    handles: Vec<JoinHandle<()>>,
}

impl MonitorManager {
    /// Create a new monitor manager
    pub fn new(
        monitor: Arc<PriceMonitor>,
        monitor_interval: Duration,
        cleanup_interval: Duration,
    ) -> Self {
        Self {
            monitor,
            monitor_interval,
            cleanup_interval,
            handles: Vec::new(),
        }
    }

    /// Whether the background tasks are running
    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Start the scheduled runs. The first run happens one interval from now.
    pub fn start(&mut self) {
        if self.is_running() {
            log::warn!("Price monitor scheduler already running");
            return;
        }

        log::info!(
            "⏰ Price monitor scheduled every {} minutes",
            self.monitor_interval.as_secs() / 60
        );

        let monitor = self.monitor.clone();
        let every = self.monitor_interval;
        self.handles.push(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            loop {
                ticker.tick().await;
                match monitor.monitor_all_active_alerts(TriggeredBy::Cron).await {
                    Ok(summary) => log::info!(
                        "✅ Scheduled price check: {} checked, {} triggered, {} failed",
                        summary.alerts_checked,
                        summary.alerts_triggered,
                        summary.alerts_failed
                    ),
                    Err(e) => log::error!("❌ Scheduled price check failed: {}", e),
                }
            }
        }));

        let monitor = self.monitor.clone();
        let every = self.cleanup_interval;
        self.handles.push(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            loop {
                ticker.tick().await;
                match monitor.cleanup_price_history().await {
                    Ok(removed) => log::info!("🧹 Removed {} old price history records", removed),
                    Err(e) => log::error!("❌ Price history cleanup failed: {}", e),
                }
            }
        }));
    }

    /// Stop the scheduled runs
    pub async fn stop(&mut self) {
        log::info!("Stopping price monitor scheduler");

        for handle in self.handles.drain(..) {
            handle.abort();
            let _ = handle.await;
        }

        log::info!("Price monitor scheduler stopped");
    }
}

impl Drop for MonitorManager {
    fn drop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}
