//! Rendered bodies for the transactional emails sent by this service.

use chrono::NaiveDate;

/// Name of the provider-side template for price alerts.
pub const PRICE_ALERT_TEMPLATE: &str = "price-alert";

/// Values shown in a price alert email.
#[derive(Debug, Clone)]
pub struct PriceAlertContent<'a> {
    /// Recipient display name
    pub name: Option<&'a str>,
    /// Origin airport code
    pub origin: &'a str,
    /// Destination airport code
    pub destination: &'a str,
    /// Outbound date
    pub depart_date: NaiveDate,
    /// Return date for round trips
    pub return_date: Option<NaiveDate>,
    /// Fare that triggered the alert
    pub current_price: f64,
    /// Fare the user asked for
    pub target_price: f64,
    /// ISO currency code
    pub currency: &'a str,
}

/// A fully rendered email.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    /// Subject line
    pub subject: String,
    /// HTML body
    pub html: String,
    /// Plain-text body
    pub text: String,
}

/// Savings relative to the target price, in percent, never negative.
pub fn savings_percent(target_price: f64, current_price: f64) -> f64 {
    if target_price <= 0.0 {
        return 0.0;
    }
    (((target_price - current_price) / target_price) * 100.0).max(0.0)
}

fn format_price(price: f64) -> String {
    format!("{:.2}", price)
}

/// Renders the email sent when a fare reaches its target.
pub fn price_alert(content: &PriceAlertContent<'_>) -> RenderedEmail {
    let price = format_price(content.current_price);
    let target = format_price(content.target_price);
    let savings = savings_percent(content.target_price, content.current_price);
    let greeting = content.name.unwrap_or("there");

    let dates = match content.return_date {
        Some(return_date) => format!("{} to {}", content.depart_date, return_date),
        None => format!("{} (one way)", content.depart_date),
    };

    let subject = format!(
        "🎉 Price Alert: {} → {} - {} {}",
        content.origin, content.destination, content.currency, price
    );

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; color: #1f2937;">
  <h1 style="color: #2563eb;">Your fare alert was triggered</h1>
  <p>Hi {greeting},</p>
  <p>The fare for <strong>{origin} → {destination}</strong> on {dates} dropped to
     <strong>{currency} {price}</strong>, at or below your target of {currency} {target}.</p>
  <p style="font-size: 18px; color: #16a34a;">You save {savings:.0}% compared to your target.</p>
  <p>Fares change quickly, so book soon if this works for you.</p>
  <p style="font-size: 12px; color: #6b7280;">You received this email because you created a
     price alert. You can turn off price alert emails in your profile.</p>
</body>
</html>"#,
        greeting = greeting,
        origin = content.origin,
        destination = content.destination,
        dates = dates,
        currency = content.currency,
        price = price,
        target = target,
        savings = savings,
    );

    let text = format!(
        "Hi {greeting},\n\n\
         The fare for {origin} → {destination} on {dates} dropped to {currency} {price}, \
         at or below your target of {currency} {target}.\n\
         You save {savings:.0}% compared to your target.\n\n\
         Fares change quickly, so book soon if this works for you.\n",
        greeting = greeting,
        origin = content.origin,
        destination = content.destination,
        dates = dates,
        currency = content.currency,
        price = price,
        target = target,
        savings = savings,
    );

    RenderedEmail {
        subject,
        html,
        text,
    }
}
