use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A user's request to be told when a route's fare drops to a target.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PriceAlert {
    /// Unique identifier for the alert
    pub id: Uuid,
    /// Owner of the alert
    pub user_id: Uuid,
    /// Origin airport code
    pub origin: String,
    /// Destination airport code
    pub destination: String,
    /// Outbound date
    pub depart_date: NaiveDate,
    /// Return date, absent for one-way trips
    pub return_date: Option<NaiveDate>,
    /// Fare at or below which the alert triggers
    pub target_price: f64,
    /// ISO currency code
    pub currency: String,
    /// Whether the alert is monitored
    pub active: bool,
    /// Set once the target was reached, after which the alert is never checked again
    pub triggered: bool,
    /// Last observed fare
    pub current_price: Option<f64>,
    /// Last check, successful or not
    pub last_checked: Option<DateTime<Utc>>,
    /// When the target was reached
    pub triggered_at: Option<DateTime<Utc>>,
    /// When the owner was last notified
    pub last_notified_at: Option<DateTime<Utc>>,
    /// Number of notifications sent for this alert
    pub notification_count: i32,
    /// When the alert was created
    pub created_at: DateTime<Utc>,
}

impl PriceAlert {
    /// Creates an active, untriggered alert.
    pub fn new(
        user_id: Uuid,
        origin: impl Into<String>,
        destination: impl Into<String>,
        depart_date: NaiveDate,
        target_price: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            origin: origin.into(),
            destination: destination.into(),
            depart_date,
            return_date: None,
            target_price,
            currency: "USD".to_string(),
            active: true,
            triggered: false,
            current_price: None,
            last_checked: None,
            triggered_at: None,
            last_notified_at: None,
            notification_count: 0,
            created_at: Utc::now(),
        }
    }

    /// The route this alert watches.
    pub fn route(&self) -> RouteQuery {
        RouteQuery {
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            depart_date: self.depart_date,
            return_date: self.return_date,
            currency: Some(self.currency.clone()),
        }
    }
}

/// Owner details needed to notify about an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertOwner {
    /// User id
    pub user_id: Uuid,
    /// Notification address
    pub email: String,
    /// Display name
    pub name: Option<String>,
    /// Whether the user accepts price alert emails
    pub price_alert_emails: bool,
}

/// An alert loaded together with its owner.
#[derive(Debug, Clone)]
pub struct AlertWithOwner {
    /// The alert
    pub alert: PriceAlert,
    /// Its owner
    pub owner: AlertOwner,
}

/// A route and travel dates to price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RouteQuery {
    /// Origin airport code
    #[validate(length(equal = 3, message = "Origin must be a 3-letter airport code"))]
    pub origin: String,

    /// Destination airport code
    #[validate(length(equal = 3, message = "Destination must be a 3-letter airport code"))]
    pub destination: String,

    /// Outbound date
    pub depart_date: NaiveDate,

    /// Return date for round trips
    pub return_date: Option<NaiveDate>,

    /// Currency to price in, USD when absent
    #[validate(length(equal = 3, message = "Currency must be a 3-letter ISO code"))]
    pub currency: Option<String>,
}

impl RouteQuery {
    /// Cache key: `origin-destination-departDate-(returnDate|oneway)`.
    pub fn cache_key(&self) -> String {
        let return_part = self
            .return_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "oneway".to_string());
        format!(
            "{}-{}-{}-{}",
            self.origin, self.destination, self.depart_date, return_part
        )
    }

    /// Requested currency, USD by default.
    pub fn currency(&self) -> &str {
        self.currency.as_deref().unwrap_or("USD")
    }
}

/// A priced route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceCheckResult {
    /// Fare
    pub price: f64,
    /// ISO currency code
    pub currency: String,
    /// Name of the price source
    pub provider: String,
    /// Whether the fare came from the cache
    pub cached: bool,
    /// When the fare was fetched from the source
    pub checked_at: DateTime<Utc>,
}

/// One observed fare for a route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceHistoryRecord {
    /// Origin airport code
    pub origin: String,
    /// Destination airport code
    pub destination: String,
    /// Outbound date
    pub depart_date: NaiveDate,
    /// Return date for round trips
    pub return_date: Option<NaiveDate>,
    /// Fare
    pub price: f64,
    /// ISO currency code
    pub currency: String,
    /// Name of the price source
    pub provider: String,
    /// When the fare was observed
    pub recorded_at: DateTime<Utc>,
}

impl PriceHistoryRecord {
    /// Record for a fare observed on `route` at `recorded_at`, in the route's currency.
    pub fn observed(
        route: &RouteQuery,
        price: &PriceCheckResult,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            origin: route.origin.clone(),
            destination: route.destination.clone(),
            depart_date: route.depart_date,
            return_date: route.return_date,
            price: price.price,
            currency: route.currency().to_string(),
            provider: price.provider.clone(),
            recorded_at,
        }
    }
}

/// What started a monitoring run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggeredBy {
    /// The scheduler
    Cron,
    /// An operator through the admin API
    Manual,
}

impl TriggeredBy {
    /// Lowercase name stored in run logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggeredBy::Cron => "cron",
            TriggeredBy::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggeredBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggeredBy {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cron" => Ok(TriggeredBy::Cron),
            "manual" => Ok(TriggeredBy::Manual),
            other => Err(MonitorError::DataFormat(format!(
                "unknown run trigger '{}'",
                other
            ))),
        }
    }
}

/// An alert that could not be checked during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertFailure {
    /// Alert id
    pub alert_id: Uuid,
    /// Failure reason
    pub error: String,
}

/// Aggregate outcome of a monitoring run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitoringSummary {
    /// Alerts processed
    pub alerts_checked: usize,
    /// Alerts whose target was reached
    pub alerts_triggered: usize,
    /// Alerts that could not be checked
    pub alerts_failed: usize,
    /// One entry per failed alert
    pub errors: Vec<AlertFailure>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

/// Outcome of checking one alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertCheckOutcome {
    /// Whether a fare was obtained and the alert updated
    pub success: bool,
    /// Whether this check triggered the alert
    pub triggered: bool,
    /// Fare observed by this check
    pub current_price: Option<f64>,
    /// Failure reason
    pub error: Option<String>,
}

impl AlertCheckOutcome {
    /// Successful check.
    pub fn checked(current_price: f64, triggered: bool) -> Self {
        Self {
            success: true,
            triggered,
            current_price: Some(current_price),
            error: None,
        }
    }

    /// Failed check.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            triggered: false,
            current_price: None,
            error: Some(error.into()),
        }
    }
}

/// Persisted record of a monitoring run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorRunLog {
    /// Run id
    pub id: Uuid,
    /// What started the run
    pub triggered_by: TriggeredBy,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Alerts processed
    pub alerts_checked: i32,
    /// Alerts triggered
    pub alerts_triggered: i32,
    /// Alerts that failed
    pub alerts_failed: i32,
    /// Per-alert failures
    pub errors: Vec<AlertFailure>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: i64,
    /// Whether the run completed
    pub success: bool,
    /// Error that aborted the run
    pub fatal_error: Option<String>,
}

/// Alert and run counters read from the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertStats {
    /// Alerts still being monitored
    pub active_alerts: i64,
    /// Alerts that ever triggered
    pub triggered_alerts: i64,
    /// Alerts triggered in the last 24 hours
    pub triggered_last_24h: i64,
    /// Price history records written in the last 24 hours
    pub price_checks_last_24h: i64,
    /// Monitoring runs recorded
    pub total_runs: i64,
    /// Most recent run
    pub last_run: Option<MonitorRunLog>,
}

/// Operational view of the price monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringStats {
    /// Counters from the store
    #[serde(flatten)]
    pub alerts: AlertStats,
    /// Fares currently cached
    pub cached_prices: usize,
}

/// Paging and filtering for run logs.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ExecutionLogQuery {
    /// Page size, 1 to 100 (default: 20)
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<u32>,

    /// Rows to skip (default: 0)
    pub offset: Option<u32>,

    /// Only runs started this way
    pub triggered_by: Option<TriggeredBy>,
}

impl ExecutionLogQuery {
    /// Page size, clamped to 1..=100.
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }

    /// Rows to skip.
    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// Errors raised by the price monitor.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The alert does not exist
    #[error("Alert {0} not found")]
    AlertNotFound(Uuid),

    /// The alert is switched off
    #[error("Alert {0} is not active")]
    AlertInactive(Uuid),

    /// The alert already reached its target
    #[error("Alert {0} has already been triggered")]
    AlreadyTriggered(Uuid),

    /// The price source failed
    #[error("Price source error: {0}")]
    PriceSource(String),

    /// The notification could not be delivered
    #[error("Notification error: {0}")]
    Notification(String),

    /// Stored data could not be decoded
    #[error("Data format error: {0}")]
    DataFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key() {
        let mut query = RouteQuery {
            origin: "LAX".to_string(),
            destination: "JFK".to_string(),
            depart_date: NaiveDate::from_ymd_opt(2026, 12, 20).unwrap(),
            return_date: None,
            currency: None,
        };
        assert_eq!(query.cache_key(), "LAX-JFK-2026-12-20-oneway");
        assert_eq!(query.currency(), "USD");

        query.return_date = NaiveDate::from_ymd_opt(2027, 1, 3);
        assert_eq!(query.cache_key(), "LAX-JFK-2026-12-20-2027-01-03");
    }

    #[test]
    fn test_execution_log_query_defaults() {
        let query = ExecutionLogQuery::default();
        assert_eq!(query.limit(), 20);
        assert_eq!(query.offset(), 0);
        assert!(query.validate().is_ok());

        let query = ExecutionLogQuery {
            limit: Some(500),
            ..Default::default()
        };
        assert!(query.validate().is_err());
        assert_eq!(query.limit(), 100);
    }

    #[test]
    fn test_triggered_by_round_trip() {
        assert_eq!("manual".parse::<TriggeredBy>().unwrap(), TriggeredBy::Manual);
        assert_eq!(TriggeredBy::Cron.to_string(), "cron");
        assert!("hourly".parse::<TriggeredBy>().is_err());
    }
}
