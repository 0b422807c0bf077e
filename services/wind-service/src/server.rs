//! HTTP API for wind queries, acquisition status and metrics.
//!
//! Provides endpoints for:
//! - Wind vector queries through the tiered dispatcher
//! - Acquisition and cache status
//! - Prometheus metrics
//! - Liveness

use std::sync::Arc;

use acquisition::{AcquisitionStatus, FocusPublisher, StatusBoard};
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use wind_cache::{CacheStats, Dispatcher, QueryStats, Tier, TierCounters, Validity};
use wind_common::time::parse_iso8601;
use wind_common::{FocusPoint, Spot, WindError};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct WindResponse {
    pub time: DateTime<Utc>,
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
    pub u: f64,
    pub v: f64,
    pub speed: f64,
    pub direction: f64,
    pub tier: Tier,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub service: String,
    pub acquisition: AcquisitionStatus,
    pub cache_validity: Validity,
    pub cache: CacheStats,
    pub tiers: TierCounters,
    pub focus: FocusPoint,
}

// ============================================================================
// Query Parameters
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct WindQuery {
    /// ISO 8601, UTC when no offset is given
    pub time: String,
    pub lon: f64,
    pub lat: f64,
    pub alt: f64,
}

// ============================================================================
// Shared State
// ============================================================================

pub struct AppState {
    /// Held for the whole of a query, remote fallback included.
    pub dispatcher: Mutex<Dispatcher>,
    /// Counters of `dispatcher`, read by `/status` without taking its lock.
    pub stats: QueryStats,
    pub status: StatusBoard,
    pub focus: FocusPublisher,
    pub prometheus: PrometheusHandle,
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/wind", get(wind_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(Extension(state))
}

pub async fn run_server(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    info!(port = port, "Starting wind query server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /wind?time=...&lon=...&lat=...&alt=...
async fn wind_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<WindQuery>,
) -> Response {
    let time = match parse_iso8601(&params.time) {
        Ok(t) => t,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    if let Err(message) = validate_position(&params) {
        return error_response(StatusCode::BAD_REQUEST, message);
    }
    let spot = Spot::new(time, params.lon, params.lat, params.alt);
    state.focus.publish(FocusPoint::from(&spot));

    let result = state.dispatcher.lock().await.answer_with_tier(&spot).await;
    match result {
        Ok((wind, tier)) => Json(WindResponse {
            time,
            longitude: spot.longitude,
            latitude: spot.latitude,
            altitude: spot.altitude,
            u: wind.u,
            v: wind.v,
            speed: wind.speed(),
            direction: wind.direction_from(),
            tier,
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, time = %time, lon = spot.longitude, lat = spot.latitude, "Wind query failed");
            wind_error_response(&e)
        }
    }
}

/// GET /status
async fn status_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let acquisition = state.status.snapshot().await;
    let stats = state.stats.snapshot();

    Json(StatusResponse {
        service: "wind-service".to_string(),
        acquisition,
        cache_validity: stats.cache_validity,
        cache: stats.cache,
        tiers: stats.tiers,
        focus: state.focus.current(),
    })
}

/// GET /metrics - Prometheus text format
async fn metrics_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus.render(),
    )
}

/// GET /health
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "wind-service"
    }))
}

// ============================================================================
// Helpers
// ============================================================================

/// Reject positions that cannot be a place on Earth before they reach the
/// focus channel.
fn validate_position(params: &WindQuery) -> Result<(), String> {
    for (name, value) in [("lon", params.lon), ("lat", params.lat), ("alt", params.alt)] {
        if !value.is_finite() {
            return Err(format!("{name} must be a finite number, got {value}"));
        }
    }
    if !(-180.0..=180.0).contains(&params.lon) {
        return Err(format!("lon must be within [-180, 180], got {}", params.lon));
    }
    if !(-90.0..=90.0).contains(&params.lat) {
        return Err(format!("lat must be within [-90, 90], got {}", params.lat));
    }
    Ok(())
}

fn wind_error_response(error: &WindError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_response(status, error.to_string())
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
