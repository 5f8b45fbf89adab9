use std::time::Duration;

use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use humantime::format_duration;
use serde::Serialize;

use crate::{
    constants::START_TIME,
    repositories::{backend::BackendKind, gateway::GatewayState},
    AppState,
};

#[derive(Serialize)]
struct StorageStatus {
    state: GatewayState,
    backend: BackendKind,
    subscriptions: usize,
}

#[derive(Serialize)]
struct HealthCheckResponse {
    status: &'static str,
    uptime: String,
    timestamp: String,
    start_at: String,
    today: String,
    epoch: String,
    version: &'static str,
    storage: StorageStatus,
    media_admin: &'static str,
}

#[get("/")]
pub async fn home() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "message": "Family album media service",
        "status": "Ok",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/delete-cloudinary", "/cloudinary-usage"],
    }))
}

#[get("/health")]
pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let now = Utc::now();
    let uptime = now.signed_duration_since(*START_TIME).num_seconds().max(0) as u64;
    let today = state
        .engine
        .today()
        .map(|d| d.to_string())
        .unwrap_or_else(|_| now.date_naive().to_string());

    let response = HealthCheckResponse {
        status: "healthy",
        uptime: format_duration(Duration::from_secs(uptime)).to_string(),
        timestamp: now.to_rfc3339(),
        start_at: START_TIME.to_rfc3339(),
        today,
        epoch: state.engine.epoch().to_string(),
        version: env!("CARGO_PKG_VERSION"),
        storage: StorageStatus {
            state: state.gateway.state(),
            backend: state.gateway.active_kind(),
            subscriptions: state.gateway.subscription_count(),
        },
        media_admin: if state.media_admin.is_some() { "configured" } else { "not configured" },
    };

    HttpResponse::Ok().json(response)
}
