use actix_web::HttpResponse;
use price_monitor::MonitorError;
use serde::Serialize;

/// Errors returned by the admin API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// The price monitor failed
    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Validation(errors.to_string())
    }
}

impl actix_web::ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::Validation(msg) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "validation_error",
                "message": msg
            })),
            ApiError::Monitor(MonitorError::AlertNotFound(_)) => {
                HttpResponse::NotFound().json(serde_json::json!({
                    "error": "alert_not_found",
                    "message": self.to_string()
                }))
            }
            ApiError::Monitor(MonitorError::PriceSource(msg)) => {
                HttpResponse::BadGateway().json(serde_json::json!({
                    "error": "price_source_error",
                    "message": msg
                }))
            }
            ApiError::Monitor(e) => {
                log::error!("❌ Price monitor error: {}", e);
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "internal_error",
                    "message": "An internal error occurred"
                }))
            }
        }
    }
}

/// Response for the provider test endpoint.
#[derive(Debug, Serialize)]
pub struct ProviderTestResponse {
    /// Providers that passed
    pub healthy: usize,
    /// Providers tested
    pub total: usize,
    /// Per-provider results
    pub results: Vec<email_delivery::ProviderTestResult>,
}
