use std::env;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use super::required_env;
use crate::provider::{Delivery, EmailTransport};
use crate::types::{DeliveryStatus, EmailError, EmailRequest, TransportError};

const SMTP_RELAY: &str = "smtp.gmail.com";

/// Gmail SMTP relay transport using an app password.
///
/// Gmail has no stored templates or scheduled delivery, so requests must carry a body
/// and are always sent immediately.
pub struct GmailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl GmailTransport {
    /// Creates a Gmail transport from `GMAIL_*` environment variables.
    pub fn from_env() -> Result<Self, EmailError> {
        let email = required_env("GMAIL_EMAIL")?;
        let password = required_env("GMAIL_APP_PASSWORD")?;
        let from_name = env::var("GMAIL_FROM_NAME").unwrap_or_else(|_| "Fly2Any".to_string());

        let address = email
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("{}: {}", email, e)))?;
        let from = Mailbox::new(Some(from_name), address);

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(SMTP_RELAY)
            .map_err(|e| EmailError::Client(format!("Failed to create SMTP transport: {}", e)))?
            .credentials(Credentials::new(email, password))
            .timeout(Some(Duration::from_secs(45)))
            .build();

        Ok(Self { mailer, from })
    }

    fn build_message(
        &self,
        request: &EmailRequest,
        message_id: &str,
    ) -> Result<Message, TransportError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(request.subject.clone())
            .message_id(Some(message_id.to_string()));

        for recipient in &request.to {
            let mailbox: Mailbox = recipient.parse().map_err(|e| {
                TransportError::Rejected(format!("Invalid recipient {}: {}", recipient, e))
            })?;
            builder = builder.to(mailbox);
        }

        let message = match (&request.text_content, &request.html_content) {
            (Some(text), Some(html)) => {
                builder.multipart(MultiPart::alternative_plain_html(text.clone(), html.clone()))
            }
            (None, Some(html)) => builder.singlepart(SinglePart::html(html.clone())),
            (Some(text), None) => builder.singlepart(SinglePart::plain(text.clone())),
            (None, None) => return Err(TransportError::Rejected("message has no body".to_string())),
        };

        message.map_err(|e| TransportError::Rejected(format!("Failed to build message: {}", e)))
    }
}

fn map_smtp_error(error: lettre::transport::smtp::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_permanent() {
        TransportError::Rejected(error.to_string())
    } else {
        TransportError::Connection(error.to_string())
    }
}

#[async_trait]
impl EmailTransport for GmailTransport {
    async fn deliver(&self, request: &EmailRequest) -> Result<Delivery, TransportError> {
        let message_id = format!("<{}@fly2any.com>", uuid::Uuid::new_v4());
        let message = self.build_message(request, &message_id)?;
        debug!("Sending email via Gmail SMTP to {}", request.recipient_list());

        self.mailer.send(message).await.map_err(map_smtp_error)?;

        Ok(Delivery {
            message_id: Some(message_id),
            status: DeliveryStatus::Sent,
        })
    }

    async fn verify(&self) -> Result<(), TransportError> {
        match self.mailer.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TransportError::Connection(format!(
                "{} did not accept the connection",
                SMTP_RELAY
            ))),
            Err(e) => Err(map_smtp_error(e)),
        }
    }
}
