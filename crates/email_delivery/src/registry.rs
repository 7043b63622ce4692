use std::env;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

use crate::provider::{Provider, ProviderKind, ProviderSettings};
use crate::providers::MockTransport;
use crate::types::{ProviderStatus, ProviderTestResult};

/// Default fallback order when `EMAIL_PROVIDER_ORDER` is not set.
pub const DEFAULT_PROVIDER_ORDER: &str = "mailgun,mailersend,gmail";

/// Ordered set of email providers with a background health check loop.
pub struct ProviderRegistry {
    providers: Vec<Arc<Provider>>,
    health_check: Mutex<Option<JoinHandle<()>>>,
}

impl ProviderRegistry {
    /// Creates a registry, ordering providers by ascending priority.
    pub fn new(providers: Vec<Provider>) -> Self {
        let mut providers: Vec<Arc<Provider>> = providers.into_iter().map(Arc::new).collect();
        providers.sort_by_key(|p| p.priority());

        Self {
            providers,
            health_check: Mutex::new(None),
        }
    }

    /// Builds every provider named in `EMAIL_PROVIDER_ORDER`.
    ///
    /// Providers without credentials are kept but never tried.
    pub fn from_env() -> Self {
        let order =
            env::var("EMAIL_PROVIDER_ORDER").unwrap_or_else(|_| DEFAULT_PROVIDER_ORDER.to_string());
        Self::from_order(&order)
    }

    /// Builds providers from a comma separated order, priorities starting at 1.
    pub fn from_order(order: &str) -> Self {
        let mut kinds = ProviderKind::parse_order(order);
        if kinds.is_empty() {
            warn!(
                "⚠️ No known email providers in '{}', using default order",
                order
            );
            kinds = ProviderKind::ALL.to_vec();
        }

        let providers: Vec<Provider> = kinds
            .iter()
            .zip(1u32..)
            .map(|(kind, priority)| kind.build(priority))
            .collect();

        let registry = Self::new(providers);
        info!(
            "📧 Email providers configured: {}",
            registry
                .providers
                .iter()
                .map(|p| p.name())
                .collect::<Vec<_>>()
                .join(" → ")
        );
        registry
    }

    /// A registry with a single logging provider that never contacts a real backend.
    pub fn dry_run() -> Self {
        info!("📧 Email dry run enabled, emails will only be logged");
        let settings = ProviderSettings {
            name: "LOG".to_string(),
            priority: 1,
            requests_per_minute: u32::MAX,
            timeout: Duration::from_secs(5),
        };
        Self::new(vec![Provider::new(settings, Arc::new(MockTransport::log_only()))])
    }

    /// All providers in priority order.
    pub fn providers(&self) -> &[Arc<Provider>] {
        &self.providers
    }

    /// Providers currently eligible for sends, in priority order.
    pub async fn healthy_providers(&self) -> Vec<Arc<Provider>> {
        let mut healthy = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            if provider.is_healthy().await {
                healthy.push(provider.clone());
            }
        }
        healthy
    }

    /// Status snapshot of every provider.
    pub async fn statuses(&self) -> Vec<ProviderStatus> {
        join_all(self.providers.iter().map(|p| p.status())).await
    }

    /// Runs a connection test against every provider concurrently.
    pub async fn test_all(&self) -> Vec<ProviderTestResult> {
        join_all(self.providers.iter().map(|provider| async move {
            match provider.check_connection().await {
                Ok(()) => ProviderTestResult {
                    name: provider.name().to_string(),
                    healthy: true,
                    error: None,
                },
                Err(e) => ProviderTestResult {
                    name: provider.name().to_string(),
                    healthy: false,
                    error: Some(e.to_string()),
                },
            }
        }))
        .await
    }

    /// Tests every configured provider once, logging health transitions.
    pub async fn run_health_checks(&self) {
        debug!("Running email provider health checks");

        for provider in &self.providers {
            let was_healthy = provider.is_healthy().await;
            if provider.status().await.is_configured {
                let healthy = provider.test_connection().await;
                if healthy && !was_healthy {
                    info!("✅ {} provider recovered", provider.name());
                } else if !healthy && was_healthy {
                    warn!("⚠️ {} provider became unhealthy", provider.name());
                }
            }
        }
    }

    /// Starts the periodic health check loop. A running loop is replaced.
    ///
    /// The loop holds only a weak reference and ends once the registry is dropped.
    pub fn start_health_checks(self: &Arc<Self>, every: Duration) {
        let registry: Weak<Self> = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.run_health_checks().await;
            }
        });

        if let Ok(mut guard) = self.health_check.lock() {
            if let Some(previous) = guard.replace(handle) {
                previous.abort();
            }
        }
        info!(
            "🩺 Email provider health checks every {} seconds",
            every.as_secs()
        );
    }

    /// Stops the health check loop if it is running.
    pub fn stop_health_checks(&self) {
        if let Ok(mut guard) = self.health_check.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
                info!("Email provider health checks stopped");
            }
        }
    }
}

impl Drop for ProviderRegistry {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.health_check.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}
