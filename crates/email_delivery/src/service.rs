use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::provider::Provider;
use crate::registry::ProviderRegistry;
use crate::telemetry::DeliveryTelemetry;
use crate::types::*;

/// Backoff applied between attempts on the same provider.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum attempts per provider (default: 3)
    pub max_attempts: u32,

    /// Delay before the second attempt (default: 1 second)
    pub base_delay: Duration,

    /// Upper bound for any delay (default: 10 seconds)
    pub max_delay: Duration,

    /// Growth factor between delays (default: 2)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    fn attempts_for(&self, request: &EmailRequest) -> u32 {
        request
            .retry_attempts
            .unwrap_or(self.max_attempts)
            .min(self.max_attempts)
            .max(1)
    }
}

/// Progress reported after each group of batches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulkProgress {
    /// Share of emails processed so far
    pub percent: f64,
    /// Emails accepted so far, sent or queued
    pub sent: usize,
    /// Emails that failed so far
    pub failed: usize,
}

/// Options for [`EmailDeliveryService::send_bulk_emails`].
pub struct BulkSendOptions {
    /// Emails per batch (default: 100)
    pub batch_size: usize,

    /// Batches sent concurrently (default: 3)
    pub parallel_batches: usize,

    /// Called after each group of batches
    pub progress: Option<Box<dyn Fn(BulkProgress) + Send + Sync>>,
}

impl Default for BulkSendOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            parallel_batches: 3,
            progress: None,
        }
    }
}

/// Pause between groups of bulk batches.
const BULK_GROUP_PAUSE: Duration = Duration::from_millis(100);

/// Sends email through the registry's providers with retry and fallback.
pub struct EmailDeliveryService {
    registry: Arc<ProviderRegistry>,
    telemetry: DeliveryTelemetry,
    retry: RetryConfig,
}

impl EmailDeliveryService {
    /// Creates a service with default retry settings and no audit log.
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            telemetry: DeliveryTelemetry::disabled(),
            retry: RetryConfig::default(),
        }
    }

    /// Records every send through `telemetry`.
    pub fn with_telemetry(mut self, telemetry: DeliveryTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Overrides the retry settings.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The provider registry.
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Sends one email, trying healthy providers in priority order.
    ///
    /// The first provider that accepts the email wins. A non-retryable failure stops the
    /// chain without trying the remaining providers.
    pub async fn send_email(&self, request: &EmailRequest) -> EmailResult {
        let log_id = Uuid::new_v4();
        let started = Instant::now();
        self.telemetry.pending(log_id, request).await;

        let providers = self.registry.healthy_providers().await;
        if providers.is_empty() {
            error!("❌ No healthy email providers for {}", request.recipient_list());
            let result = EmailResult::failed(None, "All email providers are unavailable", false);
            self.telemetry
                .failed(log_id, "All email providers are unavailable", started.elapsed())
                .await;
            return result;
        }

        let mut last_result: Option<EmailResult> = None;

        for provider in providers {
            let result = self.send_with_retry(&provider, request).await;

            if result.success {
                info!(
                    "✅ Email sent via {} to {}",
                    provider.name(),
                    request.recipient_list()
                );
                self.telemetry.sent(log_id, &result, started.elapsed()).await;
                return result;
            }

            let retryable = result.retryable;
            warn!(
                "⚠️ {} failed for {}: {}",
                provider.name(),
                request.recipient_list(),
                result.error.as_deref().unwrap_or("Unknown error")
            );
            last_result = Some(result);

            if !retryable {
                debug!("Non-retryable failure, not trying remaining providers");
                break;
            }
        }

        let (provider, last_error, retryable) = match last_result {
            Some(result) => (result.provider, result.error, result.retryable),
            None => (None, None, false),
        };
        let error = format!(
            "All providers failed. Last error: {}",
            last_error.as_deref().unwrap_or("Unknown error")
        );

        error!("❌ {}", error);
        self.telemetry.failed(log_id, &error, started.elapsed()).await;
        EmailResult::failed(provider.as_deref(), error, retryable)
    }

    /// Sends through one provider with exponential backoff between attempts.
    pub async fn send_with_retry(&self, provider: &Provider, request: &EmailRequest) -> EmailResult {
        let attempts = self.retry.attempts_for(request);
        let mut attempt = 1;

        loop {
            let result = provider.send(request).await;

            if result.success || !result.retryable || attempt >= attempts {
                return result;
            }

            let delay = self.retry.delay_for(attempt);
            debug!(
                "{} attempt {}/{} failed, retrying in {}ms",
                provider.name(),
                attempt,
                attempts,
                delay.as_millis()
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// Sends many emails in concurrent batches and reports the aggregate outcome.
    ///
    /// One email's failure never aborts the others.
    pub async fn send_bulk_emails(
        &self,
        emails: Vec<EmailRequest>,
        options: BulkSendOptions,
    ) -> BulkEmailResult {
        let started = Instant::now();
        let total = emails.len();
        let mut report = BulkEmailResult {
            total_emails: total,
            ..Default::default()
        };

        info!("📨 Starting bulk send of {} emails", total);

        let batches: Vec<&[EmailRequest]> = emails.chunks(options.batch_size.max(1)).collect();
        let groups: Vec<&[&[EmailRequest]]> =
            batches.chunks(options.parallel_batches.max(1)).collect();
        let mut processed = 0;

        for (index, group) in groups.iter().enumerate() {
            let sends = group
                .iter()
                .flat_map(|batch| batch.iter())
                .map(|email| async move { (email, self.send_email(email).await) });

            for (email, result) in join_all(sends).await {
                processed += 1;
                tally(&mut report, email, result);
            }

            if let Some(ref progress) = options.progress {
                progress(BulkProgress {
                    percent: (processed * 100) as f64 / total as f64,
                    sent: report.sent + report.queued,
                    failed: report.failed,
                });
            }

            if index + 1 < groups.len() {
                sleep(BULK_GROUP_PAUSE).await;
            }
        }

        report.processing_time_ms = started.elapsed().as_millis() as u64;
        report.delivery_rate = if total == 0 {
            0.0
        } else {
            ((report.sent + report.queued) * 100) as f64 / total as f64
        };

        info!(
            "📨 Bulk send finished: {} sent, {} queued, {} failed in {}ms",
            report.sent, report.queued, report.failed, report.processing_time_ms
        );

        report
    }

    /// Health and rate limit snapshot of every provider.
    pub async fn provider_status(&self) -> Vec<ProviderStatus> {
        self.registry.statuses().await
    }

    /// Runs a connection test against every provider.
    pub async fn test_all_providers(&self) -> Vec<ProviderTestResult> {
        self.registry.test_all().await
    }
}

fn tally(report: &mut BulkEmailResult, email: &EmailRequest, result: EmailResult) {
    if result.success {
        if result.delivery_status == DeliveryStatus::Queued {
            report.queued += 1;
        } else {
            report.sent += 1;
        }
        if let Some(provider) = result.provider {
            *report.provider_usage.entry(provider).or_insert(0) += 1;
        }
    } else {
        report.failed += 1;
        report.errors.push(BulkEmailFailure {
            email: email.recipient_list(),
            error: result.error.unwrap_or_else(|| "Unknown error".to_string()),
            retryable: result.retryable,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Delivery, ProviderSettings};
    use crate::providers::MockTransport;
    use std::sync::Mutex;

    fn provider(name: &str, priority: u32, transport: Arc<MockTransport>) -> Provider {
        Provider::new(
            ProviderSettings {
                name: name.to_string(),
                priority,
                requests_per_minute: 1000,
                timeout: Duration::from_secs(30),
            },
            transport,
        )
    }

    fn three_providers() -> (EmailDeliveryService, [Arc<MockTransport>; 3]) {
        let transports = [
            Arc::new(MockTransport::new()),
            Arc::new(MockTransport::new()),
            Arc::new(MockTransport::new()),
        ];
        let registry = ProviderRegistry::new(vec![
            provider("A", 1, transports[0].clone()),
            provider("B", 2, transports[1].clone()),
            provider("C", 3, transports[2].clone()),
        ]);
        (EmailDeliveryService::new(Arc::new(registry)), transports)
    }

    fn request(to: &str) -> EmailRequest {
        EmailRequest::new([to], "Your trip").text("Hello")
    }

    fn unavailable() -> TransportError {
        TransportError::Http {
            status: 503,
            message: "Service Unavailable".to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_healthy_provider_wins() {
        let (service, [a, b, c]) = three_providers();

        let result = service.send_email(&request("a@example.com")).await;

        assert!(result.success);
        assert_eq!(result.provider.as_deref(), Some("A"));
        assert_eq!(a.call_count(), 1);
        assert_eq!(b.call_count(), 0);
        assert_eq!(c.call_count(), 0);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_stops_fallback() {
        let (service, [a, b, c]) = three_providers();
        a.push_failure(TransportError::Rejected("invalid recipient".to_string()))
            .await;

        let result = service.send_email(&request("bad@example.com")).await;

        assert!(!result.success);
        assert!(!result.retryable);
        assert_eq!(
            result.error.as_deref(),
            Some("All providers failed. Last error: invalid recipient")
        );
        assert_eq!(a.call_count(), 1);
        assert_eq!(b.call_count(), 0);
        assert_eq!(c.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_between_attempts() {
        let (service, [a, b, _]) = three_providers();
        for _ in 0..3 {
            a.push_failure(unavailable()).await;
        }

        let result = service.send_email(&request("a@example.com")).await;

        assert!(result.success);
        assert_eq!(result.provider.as_deref(), Some("B"));

        let times = a.call_times().await;
        assert_eq!(times.len(), 3);
        assert_eq!(times[1] - times[0], Duration::from_millis(1000));
        assert_eq!(times[2] - times[1], Duration::from_millis(2000));
        assert_eq!(b.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_second_attempt_stops_retrying() {
        let (service, [a, b, _]) = three_providers();
        a.push_failure(unavailable()).await;

        let result = service.send_email(&request("a@example.com")).await;

        assert!(result.success);
        assert_eq!(result.provider.as_deref(), Some("A"));
        assert_eq!(a.call_count(), 2);
        assert_eq!(b.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_attempts_override_is_capped() {
        let (service, [a, _, _]) = three_providers();
        for _ in 0..10 {
            a.push_failure(unavailable()).await;
        }

        let first = service.registry().providers()[0].clone();

        service
            .send_with_retry(&first, &request("a@example.com").retry_attempts(10))
            .await;
        assert_eq!(a.call_count(), 3);

        service
            .send_with_retry(&first, &request("a@example.com").retry_attempts(1))
            .await;
        assert_eq!(a.call_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_stay_retryable() {
        let (service, transports) = three_providers();
        for transport in &transports {
            for _ in 0..3 {
                transport.push_failure(unavailable()).await;
            }
        }

        let result = service.send_email(&request("a@example.com")).await;

        assert!(!result.success);
        assert!(result.retryable);
        assert_eq!(result.provider.as_deref(), Some("C"));
        assert!(
            result
                .error
                .as_deref()
                .is_some_and(|e| e.starts_with("All providers failed. Last error: HTTP 503"))
        );
    }

    #[tokio::test]
    async fn test_no_healthy_providers() {
        let registry = ProviderRegistry::new(vec![Provider::unconfigured(
            ProviderSettings {
                name: "A".to_string(),
                priority: 1,
                requests_per_minute: 10,
                timeout: Duration::from_secs(30),
            },
            "missing key".to_string(),
        )]);
        let service = EmailDeliveryService::new(Arc::new(registry));

        let result = service.send_email(&request("a@example.com")).await;

        assert!(!result.success);
        assert!(!result.retryable);
        assert_eq!(
            result.error.as_deref(),
            Some("All email providers are unavailable")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_send_all_succeed() {
        let (service, [a, _, _]) = three_providers();
        let emails: Vec<EmailRequest> = (0..250)
            .map(|i| request(&format!("user{}@example.com", i)))
            .collect();

        let progress = Arc::new(Mutex::new(Vec::new()));
        let seen = progress.clone();
        let options = BulkSendOptions {
            batch_size: 50,
            parallel_batches: 2,
            progress: Some(Box::new(move |p: BulkProgress| {
                seen.lock().unwrap().push(p);
            })),
        };

        let report = service.send_bulk_emails(emails, options).await;

        assert_eq!(report.total_emails, 250);
        assert_eq!(report.sent, 250);
        assert_eq!(report.failed, 0);
        assert_eq!(report.delivery_rate, 100.0);
        assert_eq!(report.provider_usage.get("A"), Some(&250));
        assert_eq!(a.call_count(), 250);

        let progress = progress.lock().unwrap();
        assert_eq!(progress.len(), 3);
        assert_eq!(progress[0].percent, 40.0);
        assert_eq!(progress[2].percent, 100.0);
        assert_eq!(progress[2].sent, 250);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_send_collects_failures() {
        let (service, [a, b, _]) = three_providers();
        a.push_failure(TransportError::Rejected("mailbox does not exist".to_string()))
            .await;
        b.push_delivery(Delivery {
            message_id: Some("m-1".to_string()),
            status: DeliveryStatus::Queued,
        })
        .await;

        let emails = vec![request("gone@example.com"), request("later@example.com")];
        let report = service
            .send_bulk_emails(
                emails,
                BulkSendOptions {
                    parallel_batches: 1,
                    batch_size: 1,
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.errors[0].email, "gone@example.com");
        assert!(!report.errors[0].retryable);
        assert_eq!(
            report.errors[0].error,
            "All providers failed. Last error: mailbox does not exist"
        );

        // A is unhealthy after the permanent failure so B takes the second email
        assert_eq!(report.queued, 1);
        assert_eq!(report.sent, 0);
        assert_eq!(report.provider_usage.get("B"), Some(&1));
        assert_eq!(report.delivery_rate, 50.0);
    }

    #[test]
    fn test_delay_is_capped() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for(1), Duration::from_millis(1000));
        assert_eq!(retry.delay_for(2), Duration::from_millis(2000));
        assert_eq!(retry.delay_for(4), Duration::from_millis(8000));
        assert_eq!(retry.delay_for(5), Duration::from_millis(10_000));
    }
}
