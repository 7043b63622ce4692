use actix_web::{HttpResponse, Result, web};
use email_delivery::EmailDeliveryService;

use crate::api_types::ProviderTestResponse;

/// Health and rate limit status of every email provider
pub async fn get_provider_status(
    delivery: web::Data<EmailDeliveryService>,
) -> Result<HttpResponse> {
    let providers = delivery.provider_status().await;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "providers": providers })))
}

/// Runs a connection test against every email provider
pub async fn test_email_providers(
    delivery: web::Data<EmailDeliveryService>,
) -> Result<HttpResponse> {
    let results = delivery.test_all_providers().await;
    let healthy = results.iter().filter(|r| r.healthy).count();

    log::info!(
        "🩺 Email provider test: {}/{} healthy",
        healthy,
        results.len()
    );

    Ok(HttpResponse::Ok().json(ProviderTestResponse {
        healthy,
        total: results.len(),
        results,
    }))
}
