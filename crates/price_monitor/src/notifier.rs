use std::sync::Arc;

use async_trait::async_trait;
use email_delivery::templates::{self, PRICE_ALERT_TEMPLATE, PriceAlertContent};
use email_delivery::{EmailDeliveryService, EmailPriority, EmailRequest};
use serde_json::json;
use tracing::info;

use crate::types::{AlertOwner, MonitorError, PriceAlert};

/// Tells an alert's owner that the target fare was reached.
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    /// Sends the notification for `alert` at `current_price`.
    async fn notify_price_alert(
        &self,
        alert: &PriceAlert,
        owner: &AlertOwner,
        current_price: f64,
    ) -> Result<(), MonitorError>;
}

/// Notifier sending price alert emails through the delivery service.
pub struct EmailAlertNotifier {
    delivery: Arc<EmailDeliveryService>,
}

impl EmailAlertNotifier {
    /// Creates a notifier on the given delivery service.
    pub fn new(delivery: Arc<EmailDeliveryService>) -> Self {
        Self { delivery }
    }
}

/// Builds the price alert email for `owner`.
pub fn price_alert_email(alert: &PriceAlert, owner: &AlertOwner, current_price: f64) -> EmailRequest {
    let rendered = templates::price_alert(&PriceAlertContent {
        name: owner.name.as_deref(),
        origin: &alert.origin,
        destination: &alert.destination,
        depart_date: alert.depart_date,
        return_date: alert.return_date,
        current_price,
        target_price: alert.target_price,
        currency: &alert.currency,
    });

    let data = json!({
        "origin": alert.origin,
        "destination": alert.destination,
        "departDate": alert.depart_date,
        "returnDate": alert.return_date,
        "currentPrice": current_price,
        "targetPrice": alert.target_price,
        "currency": alert.currency,
        "savingsPercent": templates::savings_percent(alert.target_price, current_price).round(),
        "alertId": alert.id,
    });

    EmailRequest::new([owner.email.clone()], rendered.subject)
        .html(rendered.html)
        .text(rendered.text)
        .template(PRICE_ALERT_TEMPLATE, data)
        .priority(EmailPriority::High)
        .tag("price-alert")
        .contact_id(owner.user_id.to_string())
}

#[async_trait]
impl AlertNotifier for EmailAlertNotifier {
    async fn notify_price_alert(
        &self,
        alert: &PriceAlert,
        owner: &AlertOwner,
        current_price: f64,
    ) -> Result<(), MonitorError> {
        let request = price_alert_email(alert, owner, current_price);
        let result = self.delivery.send_email(&request).await;

        if result.success {
            info!(
                "📧 Price alert email for {} sent to {} via {}",
                alert.id,
                owner.email,
                result.provider.as_deref().unwrap_or("unknown provider")
            );
            Ok(())
        } else {
            Err(MonitorError::Notification(
                result
                    .error
                    .unwrap_or_else(|| "Unknown email error".to_string()),
            ))
        }
    }
}
