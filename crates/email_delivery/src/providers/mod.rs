/// Gmail SMTP relay transport.
mod gmail;
pub use gmail::*;

/// MailerSend HTTP API transport.
mod mailersend;
pub use mailersend::*;

/// Mailgun HTTP API transport.
mod mailgun;
pub use mailgun::*;

/// Mock transport for development and tests.
mod mock;
pub use mock::*;

use std::env;

use reqwest::Response;

use crate::types::{EmailError, TransportError};

/// Reads a required environment variable.
pub(crate) fn required_env(name: &str) -> Result<String, EmailError> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| EmailError::MissingConfig(format!("{} environment variable not set", name)))
}

/// Turns a non-success HTTP response into a transport error.
pub(crate) async fn error_from_response(response: Response) -> TransportError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("Unknown error").to_string()
    } else {
        body
    };

    TransportError::Http {
        status: status.as_u16(),
        message,
    }
}
