use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use crate::types::{MonitorError, RouteQuery};

/// Upstream that prices a route.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Name recorded with every fare from this source.
    fn name(&self) -> &str;

    /// Current fare for the route in the query's currency.
    async fn fetch_price(&self, query: &RouteQuery) -> Result<f64, MonitorError>;
}

/// Deterministic fare generator used until a real fare API is wired in.
///
/// The base fare comes from a stable hash of the route and lies in 150..1000. Each call
/// adds up to ±5% jitter.
#[derive(Debug, Default)]
pub struct MockPriceSource {
    calls: AtomicUsize,
}

impl MockPriceSource {
    /// Creates the mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fares generated.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Base fare for a route before jitter.
    pub fn base_price(query: &RouteQuery) -> f64 {
        let hash = query
            .cache_key()
            .bytes()
            .fold(0u32, |hash, b| hash.wrapping_mul(31).wrapping_add(u32::from(b)));
        150.0 + f64::from(hash % 850)
    }
}

fn jitter() -> f64 {
    rand::rng().random_range(-0.05..=0.05)
}

#[async_trait]
impl PriceSource for MockPriceSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_price(&self, query: &RouteQuery) -> Result<f64, MonitorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let price = Self::base_price(query) * (1.0 + jitter());
        let price = (price * 100.0).round() / 100.0;

        debug!(
            "Generated mock fare {} {} for {}",
            price,
            query.currency(),
            query.cache_key()
        );
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn query(destination: &str) -> RouteQuery {
        RouteQuery {
            origin: "LAX".to_string(),
            destination: destination.to_string(),
            depart_date: NaiveDate::from_ymd_opt(2026, 12, 20).unwrap(),
            return_date: None,
            currency: None,
        }
    }

    #[test]
    fn test_base_price_is_stable() {
        let base = MockPriceSource::base_price(&query("JFK"));
        assert_eq!(base, MockPriceSource::base_price(&query("JFK")));
        assert!((150.0..1000.0).contains(&base));
    }

    #[tokio::test]
    async fn test_fares_stay_within_jitter() {
        let source = MockPriceSource::new();
        let route = query("JFK");
        let base = MockPriceSource::base_price(&route);

        for _ in 0..50 {
            let price = source.fetch_price(&route).await.unwrap();
            assert!(price >= (base * 0.95 * 100.0).floor() / 100.0);
            assert!(price <= (base * 1.05 * 100.0).ceil() / 100.0);
        }
        assert_eq!(source.call_count(), 50);
    }
}
