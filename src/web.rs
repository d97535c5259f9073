//! JSON API over the device service
//!
//! - `GET  /api/devices`            merged device list
//! - `POST /api/devices/{mac}/vpn`  body `{"enabled": bool}`
//! - `GET  /api/health`             router reachability

use crate::devices::DeviceService;
use crate::parser::is_valid_mac;
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// A toggle makes up to five router round-trips of at most 10s each
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_BODY_SIZE: usize = 16 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub devices: DeviceService,
    /// Router address reported by the health endpoint
    pub router: Arc<str>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/devices", get(list_devices))
        .route("/api/devices/{mac}/vpn", post(set_device_vpn))
        .route("/api/health", get(health))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
}

pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Listening on http://localhost:{}", port);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn list_devices(State(state): State<AppState>) -> Response {
    match state.devices.list_devices().await {
        Ok(devices) => Json(devices).into_response(),
        Err(e) => {
            tracing::error!("Failed to fetch devices: {:#}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch devices from router",
            )
        }
    }
}

async fn set_device_vpn(
    State(state): State<AppState>,
    Path(mac): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    if !is_valid_mac(&mac) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid MAC address format");
    }

    let enabled = body
        .ok()
        .and_then(|Json(body)| body.get("enabled").and_then(Value::as_bool));
    let Some(enabled) = enabled else {
        return error_response(StatusCode::BAD_REQUEST, "\"enabled\" must be a boolean");
    };

    match state.devices.set_device_vpn(&mac, enabled).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            tracing::error!("Failed to set VPN for {}: {:#}", mac, e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to set VPN for {}", mac),
            )
        }
    }
}

async fn health(State(state): State<AppState>) -> Response {
    let healthy = state.devices.check_health().await;
    let (status, label) = if healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unreachable")
    };

    (
        status,
        Json(json!({ "status": label, "router": &*state.router })),
    )
        .into_response()
}
