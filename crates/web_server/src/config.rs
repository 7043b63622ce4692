use std::time::Duration;

use price_monitor::MonitorConfig;

/// Settings of the server process, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds to (default: 0.0.0.0:8080)
    pub bind_addr: String,

    /// Whether the scheduled monitoring runs are enabled (default: true)
    pub monitor_enabled: bool,

    /// Time between scheduled monitoring runs (default: 60 minutes)
    pub monitor_interval: Duration,

    /// Time between price history retention sweeps (default: 24 hours)
    pub cleanup_interval: Duration,

    /// Days of price history to keep (default: 90)
    pub history_retention_days: i64,

    /// Log emails instead of sending them (default: false)
    pub email_dry_run: bool,

    /// Time between email provider health checks (default: 5 minutes)
    pub email_health_check_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            monitor_enabled: true,
            monitor_interval: Duration::from_secs(60 * 60),
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
            history_retention_days: 90,
            email_dry_run: false,
            email_health_check_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl ServerConfig {
    /// Reads the config from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the config through `lookup`. Missing or unparsable values keep their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let minutes = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|m| *m > 0)
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(default)
        };

        Self {
            bind_addr: lookup("BIND_ADDR")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.bind_addr),
            monitor_enabled: lookup("PRICE_MONITOR_ENABLED")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.monitor_enabled),
            monitor_interval: minutes("PRICE_MONITOR_INTERVAL_MINUTES", defaults.monitor_interval),
            cleanup_interval: defaults.cleanup_interval,
            history_retention_days: lookup("PRICE_HISTORY_RETENTION_DAYS")
                .and_then(|v| v.trim().parse::<i64>().ok())
                .filter(|d| *d > 0)
                .unwrap_or(defaults.history_retention_days),
            email_dry_run: lookup("EMAIL_DRY_RUN")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.email_dry_run),
            email_health_check_interval: minutes(
                "EMAIL_HEALTH_CHECK_MINUTES",
                defaults.email_health_check_interval,
            ),
        }
    }

    /// Monitor settings derived from this config.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            history_retention_days: self.history_retention_days,
            ..MonitorConfig::default()
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
