use actix_web::{HttpResponse, Result, web};
use price_monitor::{ExecutionLogQuery, PriceMonitor, RouteQuery, TriggeredBy};
use validator::Validate;

use crate::api_types::ApiError;

/// Runs the price monitor over every active alert
pub async fn run_price_monitor(
    monitor: web::Data<PriceMonitor>,
) -> Result<HttpResponse, ApiError> {
    log::info!("🔍 Manual price monitoring run requested");
    let summary = monitor
        .monitor_all_active_alerts(TriggeredBy::Manual)
        .await?;

    Ok(HttpResponse::Ok().json(summary))
}

/// Checks a single alert right away
pub async fn check_price_alert(
    monitor: web::Data<PriceMonitor>,
    path: web::Path<uuid::Uuid>,
) -> Result<HttpResponse, ApiError> {
    let alert_id = path.into_inner();
    let outcome = monitor.check_single_alert(alert_id).await;

    Ok(HttpResponse::Ok().json(outcome))
}

/// Alert, run and cache counters
pub async fn get_monitoring_stats(
    monitor: web::Data<PriceMonitor>,
) -> Result<HttpResponse, ApiError> {
    let stats = monitor.get_monitoring_stats().await?;
    Ok(HttpResponse::Ok().json(stats))
}

/// Lists monitoring runs, newest first
pub async fn get_execution_logs(
    monitor: web::Data<PriceMonitor>,
    query: web::Query<ExecutionLogQuery>,
) -> Result<HttpResponse, ApiError> {
    query.validate()?;

    let logs = monitor.get_execution_logs(&query).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "logs": logs,
        "limit": query.limit(),
        "offset": query.offset(),
    })))
}

/// Prices a route through the fare cache
pub async fn get_route_price(
    monitor: web::Data<PriceMonitor>,
    query: web::Query<RouteQuery>,
) -> Result<HttpResponse, ApiError> {
    query.validate()?;

    let price = monitor.get_price_for_route(&query).await?;
    Ok(HttpResponse::Ok().json(price))
}
