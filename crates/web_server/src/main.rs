//! Main entry point for the fare alert backend server.
//! This crate wires the price monitor, the email delivery service and the admin API together.

use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};
use email_delivery::{DeliveryTelemetry, EmailDeliveryService, PgEmailLog, ProviderRegistry};
use postgres::database::*;
use price_monitor::{EmailAlertNotifier, MockPriceSource, PgAlertStore, PriceMonitor};
use web_handlers::configure_routes;

mod config;
mod monitor_manager;

use config::ServerConfig;
use monitor_manager::MonitorManager;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("🚀 Starting fare alert server...");

    let config = ServerConfig::from_env();

    // Create database connection pool
    let pool = match create_connection_pool().await {
        Ok(pool) => {
            log::info!("🗃️ Database pool created successfully");

            if let Err(e) = test_connection(&pool).await {
                log::error!("❌ Database connection test failed: {}", e);
            }
            pool
        }
        Err(e) => {
            log::error!("❌ Failed to create database pool: {}", e);
            return Err(e.into());
        }
    };
    ensure_schema(&pool).await?;

    // Email providers
    let registry = Arc::new(if config.email_dry_run {
        ProviderRegistry::dry_run()
    } else {
        ProviderRegistry::from_env()
    });
    if registry.healthy_providers().await.is_empty() {
        log::warn!("🔧 No email provider is configured and healthy, alert emails will fail");
    }
    registry.start_health_checks(config.email_health_check_interval);

    let delivery = Arc::new(
        EmailDeliveryService::new(registry.clone())
            .with_telemetry(DeliveryTelemetry::new(Arc::new(PgEmailLog::new(pool.clone())))),
    );

    let monitor = Arc::new(PriceMonitor::new(
        Arc::new(PgAlertStore::new(pool.clone())),
        Arc::new(MockPriceSource::new()),
        Arc::new(EmailAlertNotifier::new(delivery.clone())),
        Some(config.monitor_config()),
    ));

    let mut manager = MonitorManager::new(
        monitor.clone(),
        config.monitor_interval,
        config.cleanup_interval,
    );
    if config.monitor_enabled {
        manager.start();
    } else {
        log::info!("⏸️ Scheduled price monitoring disabled");
    }

    log::info!("🌐 Server will be available at: http://{}", config.bind_addr);

    let monitor_data = web::Data::from(monitor);
    let delivery_data = web::Data::from(delivery);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(monitor_data.clone())
            .app_data(delivery_data.clone())
            .wrap(Logger::default())
            .configure(configure_routes)
    })
    .bind(&config.bind_addr)?
    .run()
    .await;

    manager.stop().await;
    registry.stop_health_checks();

    server?;
    Ok(())
}
