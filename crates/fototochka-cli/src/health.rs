//! Liveness endpoints for the hosting platform

use anyhow::Result;
use axum::{routing::get, Json, Router};
use fototochka_config::HealthConfig;
use serde::Serialize;

const SERVICE_NAME: &str = "ФотоТочка Бот";

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

async fn index() -> &'static str {
    "🤖 ФотоТочка Бот работает!"
}

async fn health() -> &'static str {
    "OK"
}

async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "running".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/status", get(status))
}

pub async fn serve(config: &HealthConfig) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!(address = %listener.local_addr()?, "Health-check server listening");

    axum::serve(listener, router()).await?;

    Ok(())
}
