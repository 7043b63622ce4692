//! # Web Handlers for the Fare Alert Service
//!
//! This crate provides the admin API handlers for the price monitor and the email
//! delivery service.

use actix_web::{HttpResponse, web};

/// Error and response types shared by the handlers
mod api_types;
pub use api_types::*;

/// Handlers for email provider status and tests
mod email_handlers;
pub use email_handlers::*;

/// Handlers for price monitoring runs, stats and logs
mod monitor_handlers;
pub use monitor_handlers::*;

/// Registers the admin API routes.
///
/// Expects `web::Data<PriceMonitor>` and `web::Data<EmailDeliveryService>` on the app.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(
                web::scope("/price-monitor")
                    .route("/run", web::post().to(run_price_monitor))
                    .route("/alerts/{alert_id}/check", web::post().to(check_price_alert))
                    .route("/stats", web::get().to(get_monitoring_stats))
                    .route("/logs", web::get().to(get_execution_logs))
                    .route("/price", web::get().to(get_route_price)),
            )
            .service(
                web::scope("/email")
                    .route("/providers", web::get().to(get_provider_status))
                    .route("/providers/test", web::post().to(test_email_providers)),
            ),
    )
    .route(
        "/health",
        web::get().to(|| async { HttpResponse::Ok().body("OK") }),
    );
}
