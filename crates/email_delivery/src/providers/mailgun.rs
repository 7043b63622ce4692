use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{error_from_response, required_env};
use crate::provider::{Delivery, EmailTransport};
use crate::types::{DeliveryStatus, EmailError, EmailRequest, TransportError};

/// Mailgun HTTP API transport.
pub struct MailgunTransport {
    client: Client,
    api_url: String,
    domain: String,
    api_key: String,
    from: String,
}

#[derive(Debug, Deserialize)]
struct MailgunResponse {
    id: Option<String>,
}

impl MailgunTransport {
    /// Creates a Mailgun transport from `MAILGUN_*` environment variables.
    pub fn from_env() -> Result<Self, EmailError> {
        let api_key = required_env("MAILGUN_API_KEY")?;
        let domain = required_env("MAILGUN_DOMAIN")?;
        let from_email =
            env::var("MAILGUN_FROM_EMAIL").unwrap_or_else(|_| format!("noreply@{}", domain));
        let from_name = env::var("MAILGUN_FROM_NAME").unwrap_or_else(|_| "Fly2Any".to_string());
        let api_url =
            env::var("MAILGUN_API_URL").unwrap_or_else(|_| "https://api.mailgun.net".to_string());

        Self::new(api_url, domain, api_key, format!("{} <{}>", from_name, from_email))
    }

    /// Creates a Mailgun transport with explicit settings.
    pub fn new(
        api_url: String,
        domain: String,
        api_key: String,
        from: String,
    ) -> Result<Self, EmailError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| EmailError::Client(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            domain,
            api_key,
            from,
        })
    }

    fn form_fields(&self, request: &EmailRequest) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("from", self.from.clone()),
            ("subject", request.subject.clone()),
        ];

        for recipient in &request.to {
            fields.push(("to", recipient.clone()));
        }

        if let Some(ref html) = request.html_content {
            fields.push(("html", html.clone()));
        }
        if let Some(ref text) = request.text_content {
            fields.push(("text", text.clone()));
        }

        // Bodies win over stored templates
        if request.html_content.is_none() && request.text_content.is_none() {
            if let Some(ref template) = request.template {
                fields.push(("template", template.clone()));
                if let Some(ref data) = request.template_data {
                    fields.push(("h:X-Mailgun-Variables", data.to_string()));
                }
            }
        }

        let tracking = if request.tracking_enabled { "yes" } else { "no" };
        fields.push(("o:tracking", tracking.to_string()));
        fields.push(("o:tracking-clicks", tracking.to_string()));
        fields.push(("o:tracking-opens", tracking.to_string()));

        for tag in &request.tags {
            fields.push(("o:tag", tag.clone()));
        }
        fields.push(("o:tag", "delivery-service".to_string()));

        fields.push(("v:campaign_id", request.campaign_id.clone().unwrap_or_default()));
        fields.push(("v:contact_id", request.contact_id.clone().unwrap_or_default()));
        fields.push(("v:priority", request.priority.as_str().to_string()));
        fields.push(("v:sent_at", Utc::now().to_rfc3339()));

        if let Some(at) = request.schedule_at {
            fields.push(("o:deliverytime", at.to_rfc2822()));
        }

        fields
    }
}

#[async_trait]
impl EmailTransport for MailgunTransport {
    async fn deliver(&self, request: &EmailRequest) -> Result<Delivery, TransportError> {
        if request.html_content.is_none()
            && request.text_content.is_none()
            && request.template.is_none()
        {
            return Err(TransportError::Rejected("Email has no body".to_string()));
        }

        let url = format!("{}/v3/{}/messages", self.api_url, self.domain);
        debug!("Sending email via Mailgun to {}", request.recipient_list());

        let response = self
            .client
            .post(&url)
            .basic_auth("api", Some(&self.api_key))
            .form(&self.form_fields(request))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: MailgunResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Rejected(format!("Failed to parse response: {}", e)))?;

        let status = match request.schedule_at {
            Some(at) if at > Utc::now() => DeliveryStatus::Queued,
            _ => DeliveryStatus::Sent,
        };

        Ok(Delivery {
            message_id: body.id,
            status,
        })
    }

    async fn verify(&self) -> Result<(), TransportError> {
        let url = format!("{}/v3/domains/{}", self.api_url, self.domain);

        let response = self
            .client
            .get(&url)
            .basic_auth("api", Some(&self.api_key))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }
}
