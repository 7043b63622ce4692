use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout};
use tracing::{info, warn};

use crate::providers::{GmailTransport, MailerSendTransport, MailgunTransport};
use crate::rate_limit::RateLimitWindow;
use crate::types::*;

/// What a transport returns for an accepted email.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Message id assigned by the provider
    pub message_id: Option<String>,
    /// Sent immediately or queued for later
    pub status: DeliveryStatus,
}

/// Trait implemented by each email backend.
///
/// Transports only talk to the provider. Health, rate limiting and timeouts are applied
/// uniformly by [`Provider`].
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Hands the email to the provider.
    async fn deliver(&self, request: &EmailRequest) -> Result<Delivery, TransportError>;

    /// Checks that the provider is reachable with the configured credentials.
    async fn verify(&self) -> Result<(), TransportError>;
}

/// The email backends this service knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Mailgun HTTP API
    Mailgun,
    /// MailerSend HTTP API
    MailerSend,
    /// Gmail SMTP relay
    Gmail,
}

impl ProviderKind {
    /// Default fallback order.
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Mailgun,
        ProviderKind::MailerSend,
        ProviderKind::Gmail,
    ];

    /// Default settings for this backend at the given priority.
    pub fn settings(&self, priority: u32) -> ProviderSettings {
        match self {
            ProviderKind::Mailgun => ProviderSettings {
                name: "MAILGUN".to_string(),
                priority,
                requests_per_minute: 100,
                timeout: Duration::from_secs(30),
            },
            ProviderKind::MailerSend => ProviderSettings {
                name: "MAILERSEND".to_string(),
                priority,
                requests_per_minute: 50,
                timeout: Duration::from_secs(30),
            },
            ProviderKind::Gmail => ProviderSettings {
                name: "GMAIL".to_string(),
                priority,
                requests_per_minute: 20,
                timeout: Duration::from_secs(45),
            },
        }
    }

    /// Builds the transport from environment variables.
    pub fn transport_from_env(&self) -> Result<Arc<dyn EmailTransport>, EmailError> {
        let transport: Arc<dyn EmailTransport> = match self {
            ProviderKind::Mailgun => Arc::new(MailgunTransport::from_env()?),
            ProviderKind::MailerSend => Arc::new(MailerSendTransport::from_env()?),
            ProviderKind::Gmail => Arc::new(GmailTransport::from_env()?),
        };
        Ok(transport)
    }

    /// Builds a provider from the environment, unconfigured when credentials are missing.
    pub fn build(&self, priority: u32) -> Provider {
        let settings = self.settings(priority);
        match self.transport_from_env() {
            Ok(transport) => {
                info!("✅ {} provider initialized", settings.name);
                Provider::new(settings, transport)
            }
            Err(e) => {
                warn!("⚠️ {} credentials not configured: {}", settings.name, e);
                Provider::unconfigured(settings, e.to_string())
            }
        }
    }

    /// Parses a comma separated provider order, skipping unknown names.
    pub fn parse_order(order: &str) -> Vec<ProviderKind> {
        let mut kinds = Vec::new();
        for name in order.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match name.parse::<ProviderKind>() {
                Ok(kind) if !kinds.contains(&kind) => kinds.push(kind),
                Ok(_) => {}
                Err(e) => warn!("Ignoring email provider in order: {}", e),
            }
        }
        kinds
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mailgun" => Ok(ProviderKind::Mailgun),
            "mailersend" => Ok(ProviderKind::MailerSend),
            "gmail" => Ok(ProviderKind::Gmail),
            other => Err(format!("unknown email provider '{}'", other)),
        }
    }
}

/// Static configuration of a provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Name used in logs, results and audit rows
    pub name: String,
    /// Lower is tried first
    pub priority: u32,
    /// Request budget per 60-second window
    pub requests_per_minute: u32,
    /// Hard timeout for a single send
    pub timeout: Duration,
}

#[derive(Debug)]
struct ProviderState {
    healthy: bool,
    failure_count: u32,
    last_failure: Option<DateTime<Utc>>,
    last_failure_reason: Option<String>,
    rate_limit: RateLimitWindow,
}

/// A configured email backend with its health and rate limit state.
pub struct Provider {
    settings: ProviderSettings,
    transport: Option<Arc<dyn EmailTransport>>,
    state: Mutex<ProviderState>,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("settings", &self.settings)
            .field("configured", &self.transport.is_some())
            .finish()
    }
}

impl Provider {
    /// Creates a healthy provider around a transport.
    pub fn new(settings: ProviderSettings, transport: Arc<dyn EmailTransport>) -> Self {
        let rate_limit = RateLimitWindow::new(settings.requests_per_minute);
        Self {
            settings,
            transport: Some(transport),
            state: Mutex::new(ProviderState {
                healthy: true,
                failure_count: 0,
                last_failure: None,
                last_failure_reason: None,
                rate_limit,
            }),
        }
    }

    /// Creates a provider without credentials. It stays unhealthy and is never tried.
    pub fn unconfigured(settings: ProviderSettings, reason: String) -> Self {
        let rate_limit = RateLimitWindow::new(settings.requests_per_minute);
        Self {
            settings,
            transport: None,
            state: Mutex::new(ProviderState {
                healthy: false,
                failure_count: 1,
                last_failure: Some(Utc::now()),
                last_failure_reason: Some(reason),
                rate_limit,
            }),
        }
    }

    /// Provider name.
    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Provider priority, lower is tried first.
    pub fn priority(&self) -> u32 {
        self.settings.priority
    }

    /// Whether the provider is currently eligible for sends.
    pub async fn is_healthy(&self) -> bool {
        self.transport.is_some() && self.state.lock().await.healthy
    }

    /// Sends an email through this provider.
    ///
    /// Never returns an error: every failure is described by the result's `error` and
    /// `retryable` fields.
    pub async fn send(&self, request: &EmailRequest) -> EmailResult {
        let Some(transport) = &self.transport else {
            return EmailResult::failed(Some(self.name()), "Provider unavailable", false);
        };

        {
            let mut state = self.state.lock().await;
            if !state.healthy {
                return EmailResult::failed(Some(self.name()), "Provider unavailable", false);
            }
            if !state.rate_limit.try_acquire(Instant::now()) {
                return EmailResult::failed(Some(self.name()), "Rate limit exceeded", true);
            }
        }

        let outcome = match timeout(self.settings.timeout, transport.deliver(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportError::Timeout),
        };

        match outcome {
            Ok(delivery) => {
                self.mark_healthy().await;
                EmailResult::accepted(self.name(), delivery.message_id, delivery.status)
            }
            Err(e) => {
                let retryable = e.is_retryable();
                warn!("{} send error: {}", self.name(), e);
                self.record_failure(&e.to_string(), !retryable).await;
                EmailResult::failed(Some(self.name()), e.to_string(), retryable)
            }
        }
    }

    /// Checks connectivity and updates health accordingly.
    pub async fn check_connection(&self) -> Result<(), TransportError> {
        let Some(transport) = &self.transport else {
            return Err(TransportError::NotConfigured(self.name().to_string()));
        };

        let outcome = match timeout(self.settings.timeout, transport.verify()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportError::Timeout),
        };

        match outcome {
            Ok(()) => {
                self.mark_healthy().await;
                Ok(())
            }
            Err(e) => {
                warn!("{} connection test failed: {}", self.name(), e);
                self.record_failure("Connection test failed", true).await;
                Err(e)
            }
        }
    }

    /// Checks connectivity, returning whether the provider is usable.
    pub async fn test_connection(&self) -> bool {
        self.check_connection().await.is_ok()
    }

    /// Current health and rate limit snapshot.
    pub async fn status(&self) -> ProviderStatus {
        let state = self.state.lock().await;
        ProviderStatus {
            name: self.settings.name.clone(),
            priority: self.settings.priority,
            is_healthy: self.transport.is_some() && state.healthy,
            is_configured: self.transport.is_some(),
            failure_count: state.failure_count,
            last_failure: state.last_failure,
            last_failure_reason: state.last_failure_reason.clone(),
            rate_limit: state.rate_limit.status(Instant::now()),
        }
    }

    async fn mark_healthy(&self) {
        let mut state = self.state.lock().await;
        state.healthy = true;
        state.failure_count = 0;
        state.last_failure = None;
        state.last_failure_reason = None;
    }

    async fn record_failure(&self, reason: &str, mark_unhealthy: bool) {
        let mut state = self.state.lock().await;
        state.failure_count += 1;
        state.last_failure = Some(Utc::now());
        state.last_failure_reason = Some(reason.to_string());

        if mark_unhealthy && state.healthy {
            state.healthy = false;
            warn!("⚠️ {} marked unhealthy: {}", self.settings.name, reason);
        }
    }
}
