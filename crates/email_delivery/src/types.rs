use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Errors raised while configuring or auditing email delivery.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// A required environment variable is missing.
    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    /// An address could not be parsed.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Database errors from the audit log.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Provider client could not be built.
    #[error("Client error: {0}")]
    Client(String),
}

/// Failure reported by a provider transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The provider answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Response status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The request did not complete in time.
    #[error("Request timeout")]
    Timeout,

    /// The connection could not be established or was reset.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The provider refused the message or the message could not be built.
    #[error("{0}")]
    Rejected(String),

    /// The provider has no credentials.
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl TransportError {
    /// Whether the failure is transient and worth retrying or falling back on.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            TransportError::Timeout | TransportError::Connection(_) => true,
            TransportError::Rejected(_) | TransportError::NotConfigured(_) => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout
        } else if error.is_connect() || error.is_request() {
            TransportError::Connection(error.to_string())
        } else if let Some(status) = error.status() {
            TransportError::Http {
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else {
            TransportError::Rejected(error.to_string())
        }
    }
}

/// Priority tag attached to an email.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailPriority {
    /// Marketing and digests
    Low,
    /// Default priority
    #[default]
    Normal,
    /// Alerts the user asked for
    High,
    /// Security and booking-critical messages
    Urgent,
}

impl EmailPriority {
    /// Lowercase name used in provider variables and audit rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailPriority::Low => "low",
            EmailPriority::Normal => "normal",
            EmailPriority::High => "high",
            EmailPriority::Urgent => "urgent",
        }
    }
}

/// Delivery state reported for a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Accepted for immediate delivery
    Sent,
    /// Accepted for scheduled delivery
    Queued,
    /// Not accepted by any provider
    Failed,
    /// Rejected by the recipient's server
    Bounced,
    /// Confirmed delivered
    Delivered,
}

impl DeliveryStatus {
    /// Uppercase name stored in the audit log.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "SENT",
            DeliveryStatus::Queued => "QUEUED",
            DeliveryStatus::Failed => "FAILED",
            DeliveryStatus::Bounced => "BOUNCED",
            DeliveryStatus::Delivered => "DELIVERED",
        }
    }
}

/// A single email to deliver.
///
/// Built with [`EmailRequest::new`] and the consuming builder methods; it is not
/// modified once handed to the delivery service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRequest {
    /// Recipient addresses
    pub to: Vec<String>,
    /// Subject line
    pub subject: String,
    /// HTML body
    pub html_content: Option<String>,
    /// Plain-text body
    pub text_content: Option<String>,
    /// Provider-side template name
    pub template: Option<String>,
    /// Variables for the template
    pub template_data: Option<serde_json::Value>,
    /// Priority tag
    pub priority: EmailPriority,
    /// Deliver at this time instead of immediately
    pub schedule_at: Option<DateTime<Utc>>,
    /// Analytics tags
    pub tags: Vec<String>,
    /// Campaign correlation id
    pub campaign_id: Option<String>,
    /// Contact correlation id
    pub contact_id: Option<String>,
    /// Open and click tracking
    pub tracking_enabled: bool,
    /// Overrides the number of attempts per provider (capped by the retry config)
    pub retry_attempts: Option<u32>,
}

impl EmailRequest {
    /// Creates a request for the given recipients with default options.
    pub fn new<I, S>(to: I, subject: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            to: to.into_iter().map(Into::into).collect(),
            subject: subject.into(),
            html_content: None,
            text_content: None,
            template: None,
            template_data: None,
            priority: EmailPriority::Normal,
            schedule_at: None,
            tags: Vec::new(),
            campaign_id: None,
            contact_id: None,
            tracking_enabled: true,
            retry_attempts: None,
        }
    }

    /// Sets the HTML body.
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html_content = Some(html.into());
        self
    }

    /// Sets the plain-text body.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }

    /// Sets the template name and its variables.
    pub fn template(mut self, name: impl Into<String>, data: serde_json::Value) -> Self {
        self.template = Some(name.into());
        self.template_data = Some(data);
        self
    }

    /// Sets the priority tag.
    pub fn priority(mut self, priority: EmailPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Schedules delivery.
    pub fn schedule_at(mut self, at: DateTime<Utc>) -> Self {
        self.schedule_at = Some(at);
        self
    }

    /// Adds an analytics tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Sets the campaign correlation id.
    pub fn campaign_id(mut self, id: impl Into<String>) -> Self {
        self.campaign_id = Some(id.into());
        self
    }

    /// Sets the contact correlation id.
    pub fn contact_id(mut self, id: impl Into<String>) -> Self {
        self.contact_id = Some(id.into());
        self
    }

    /// Enables or disables open/click tracking.
    pub fn tracking(mut self, enabled: bool) -> Self {
        self.tracking_enabled = enabled;
        self
    }

    /// Overrides the number of attempts per provider.
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    /// Recipients joined for logs and audit rows.
    pub fn recipient_list(&self) -> String {
        self.to.join(", ")
    }
}

/// Outcome of a send attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailResult {
    /// Whether a provider accepted the email
    pub success: bool,
    /// Message id assigned by the provider
    pub message_id: Option<String>,
    /// Provider that produced this result
    pub provider: Option<String>,
    /// Failure reason
    pub error: Option<String>,
    /// Whether the failure is transient
    pub retryable: bool,
    /// Delivery state
    pub delivery_status: DeliveryStatus,
}

impl EmailResult {
    /// Successful result from `provider`.
    pub fn accepted(provider: &str, message_id: Option<String>, status: DeliveryStatus) -> Self {
        Self {
            success: true,
            message_id,
            provider: Some(provider.to_string()),
            error: None,
            retryable: false,
            delivery_status: status,
        }
    }

    /// Failed result.
    pub fn failed(provider: Option<&str>, error: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            message_id: None,
            provider: provider.map(str::to_string),
            error: Some(error.into()),
            retryable,
            delivery_status: DeliveryStatus::Failed,
        }
    }
}

/// A failed email in a bulk send.
#[derive(Debug, Clone, Serialize)]
pub struct BulkEmailFailure {
    /// Recipients of the failed email
    pub email: String,
    /// Failure reason
    pub error: String,
    /// Whether the failure is transient
    pub retryable: bool,
}

/// Report produced by a bulk send.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkEmailResult {
    /// Number of emails submitted
    pub total_emails: usize,
    /// Emails accepted for immediate delivery
    pub sent: usize,
    /// Emails that no provider accepted
    pub failed: usize,
    /// Emails accepted for scheduled delivery
    pub queued: usize,
    /// Wall-clock time of the whole bulk send in milliseconds
    pub processing_time_ms: u64,
    /// Accepted emails as a percentage of the total
    pub delivery_rate: f64,
    /// Accepted emails per provider
    pub provider_usage: HashMap<String, usize>,
    /// Every failure
    pub errors: Vec<BulkEmailFailure>,
}

/// Snapshot of a provider's rate limit window.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    /// Requests allowed per window
    pub limit: u32,
    /// Requests used in the current window
    pub current: u32,
    /// Milliseconds until the window resets
    pub resets_in_ms: u64,
}

/// Snapshot of a provider's health.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    /// Provider name
    pub name: String,
    /// Lower is tried first
    pub priority: u32,
    /// Whether the provider is eligible for sends
    pub is_healthy: bool,
    /// Whether the provider has credentials
    pub is_configured: bool,
    /// Consecutive failures since the last success
    pub failure_count: u32,
    /// Time of the last failure
    pub last_failure: Option<DateTime<Utc>>,
    /// Reason of the last failure
    pub last_failure_reason: Option<String>,
    /// Rate limit window
    pub rate_limit: RateLimitStatus,
}

/// Result of an explicit connection test.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderTestResult {
    /// Provider name
    pub name: String,
    /// Whether the test succeeded
    pub healthy: bool,
    /// Failure reason
    pub error: Option<String>,
}
