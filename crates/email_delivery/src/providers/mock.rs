use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

use crate::provider::{Delivery, EmailTransport};
use crate::types::{DeliveryStatus, EmailRequest, TransportError};

/// Mock transport for development/testing.
///
/// Logs each email instead of sending it. Outcomes queued with [`MockTransport::push_failure`]
/// are returned first, after that every delivery succeeds. Requests and call times are kept
/// for inspection unless built with [`MockTransport::log_only`].
#[derive(Debug)]
pub struct MockTransport {
    outcomes: Mutex<VecDeque<Result<Delivery, TransportError>>>,
    verify_error: Mutex<Option<TransportError>>,
    requests: Mutex<Vec<EmailRequest>>,
    call_times: Mutex<Vec<Instant>>,
    calls: AtomicUsize,
    latency: Option<Duration>,
    record: bool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            outcomes: Mutex::default(),
            verify_error: Mutex::default(),
            requests: Mutex::default(),
            call_times: Mutex::default(),
            calls: AtomicUsize::new(0),
            latency: None,
            record: true,
        }
    }
}

impl MockTransport {
    /// Creates a mock that accepts every email and records what it was given.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock that only logs. Nothing but the call count is retained.
    pub fn log_only() -> Self {
        Self {
            record: false,
            ..Self::default()
        }
    }

    /// Delays every delivery by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queues a failure for the next delivery.
    pub async fn push_failure(&self, error: TransportError) {
        self.outcomes.lock().await.push_back(Err(error));
    }

    /// Queues a successful delivery with a specific status.
    pub async fn push_delivery(&self, delivery: Delivery) {
        self.outcomes.lock().await.push_back(Ok(delivery));
    }

    /// Makes connection tests fail with `error` until cleared with `None`.
    pub async fn set_verify_error(&self, error: Option<TransportError>) {
        *self.verify_error.lock().await = error;
    }

    /// Number of deliveries attempted.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Instants at which deliveries were attempted.
    pub async fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().await.clone()
    }

    /// Every request handed to this transport.
    pub async fn requests(&self) -> Vec<EmailRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl EmailTransport for MockTransport {
    async fn deliver(&self, request: &EmailRequest) -> Result<Delivery, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.record {
            self.call_times.lock().await.push(Instant::now());
            self.requests.lock().await.push(request.clone());
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(outcome) = self.outcomes.lock().await.pop_front() {
            return outcome;
        }

        info!("📧 [MOCK EMAIL] To: {}", request.recipient_list());
        info!("📧 [MOCK EMAIL] Subject: {}", request.subject);

        let status = match request.schedule_at {
            Some(at) if at > chrono::Utc::now() => DeliveryStatus::Queued,
            _ => DeliveryStatus::Sent,
        };

        Ok(Delivery {
            message_id: Some(format!("mock-email-{}", uuid::Uuid::new_v4())),
            status,
        })
    }

    async fn verify(&self) -> Result<(), TransportError> {
        match self.verify_error.lock().await.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
