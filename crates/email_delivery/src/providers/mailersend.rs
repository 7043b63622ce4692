use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::{error_from_response, required_env};
use crate::provider::{Delivery, EmailTransport};
use crate::types::{DeliveryStatus, EmailError, EmailRequest, TransportError};

const API_URL: &str = "https://api.mailersend.com/v1";

/// MailerSend HTTP API transport.
pub struct MailerSendTransport {
    client: Client,
    api_key: String,
    from_email: String,
    from_name: String,
}

#[derive(Debug, Serialize)]
struct Recipient<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    email: &'a str,
    data: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct MailerSendPayload<'a> {
    from: Recipient<'a>,
    to: Vec<Recipient<'a>>,
    subject: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    template_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    personalization: Vec<Personalization<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    send_at: Option<i64>,
}

impl MailerSendTransport {
    /// Creates a MailerSend transport from `MAILERSEND_*` environment variables.
    pub fn from_env() -> Result<Self, EmailError> {
        let api_key = required_env("MAILERSEND_API_KEY")?;
        let from_email = required_env("MAILERSEND_FROM_EMAIL")?;
        let from_name = env::var("MAILERSEND_FROM_NAME").unwrap_or_else(|_| "Fly2Any".to_string());

        Self::new(api_key, from_email, from_name)
    }

    /// Creates a MailerSend transport with explicit credentials.
    pub fn new(api_key: String, from_email: String, from_name: String) -> Result<Self, EmailError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| EmailError::Client(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            from_email,
            from_name,
        })
    }

    fn payload<'a>(&'a self, request: &'a EmailRequest) -> MailerSendPayload<'a> {
        let has_body = request.html_content.is_some() || request.text_content.is_some();

        let (template_id, personalization) = match (&request.template, &request.template_data) {
            (Some(template), data) if !has_body => {
                let personalization = match data {
                    Some(data) => request
                        .to
                        .iter()
                        .map(|email| Personalization { email, data })
                        .collect(),
                    None => Vec::new(),
                };
                (Some(template.as_str()), personalization)
            }
            _ => (None, Vec::new()),
        };

        MailerSendPayload {
            from: Recipient {
                email: &self.from_email,
                name: Some(&self.from_name),
            },
            to: request
                .to
                .iter()
                .map(|email| Recipient { email, name: None })
                .collect(),
            subject: &request.subject,
            html: request.html_content.as_deref(),
            text: request.text_content.as_deref(),
            template_id,
            personalization,
            tags: request.tags.iter().map(String::as_str).collect(),
            send_at: request.schedule_at.map(|at| at.timestamp()),
        }
    }
}

#[async_trait]
impl EmailTransport for MailerSendTransport {
    async fn deliver(&self, request: &EmailRequest) -> Result<Delivery, TransportError> {
        if request.html_content.is_none()
            && request.text_content.is_none()
            && request.template.is_none()
        {
            return Err(TransportError::Rejected("Email has no body".to_string()));
        }

        debug!("Sending email via MailerSend to {}", request.recipient_list());

        let response = self
            .client
            .post(format!("{}/email", API_URL))
            .bearer_auth(&self.api_key)
            .json(&self.payload(request))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let status = match request.schedule_at {
            Some(at) if at > Utc::now() => DeliveryStatus::Queued,
            _ => DeliveryStatus::Sent,
        };

        Ok(Delivery { message_id, status })
    }

    async fn verify(&self) -> Result<(), TransportError> {
        let response = self
            .client
            .get(format!("{}/api-quota", API_URL))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }
}
