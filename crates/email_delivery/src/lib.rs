//! # Email Delivery
//!
//! This crate sends email through several providers with automatic fallback.
//! It includes the provider transports (Mailgun, MailerSend, Gmail SMTP), per-provider
//! health and rate limiting, retry with exponential backoff, bulk sending and audit logging.

/// Uniform provider wrapper and the transport trait implemented by each backend.
pub mod provider;
/// Concrete provider transports.
pub mod providers;
/// Rolling per-minute request budget for a provider.
pub mod rate_limit;
/// Registry owning the configured providers and their health-check loop.
pub mod registry;
/// Delivery orchestration: fallback, retry and bulk sending.
pub mod service;
/// Best-effort audit logging of delivery attempts.
pub mod telemetry;
/// Email templates rendered by the application.
pub mod templates;
/// Types and errors shared by the delivery services.
pub mod types;

pub use provider::{Delivery, EmailTransport, Provider, ProviderKind, ProviderSettings};
pub use providers::{GmailTransport, MailerSendTransport, MailgunTransport, MockTransport};
pub use registry::ProviderRegistry;
pub use service::{BulkProgress, BulkSendOptions, EmailDeliveryService, RetryConfig};
pub use telemetry::{DeliveryTelemetry, EmailLogSink, NoopEmailLog, PgEmailLog};
pub use types::*;
